use std::path::PathBuf;

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "Pathex";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local Ollama instance used when no base URL is configured.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Model asked for specimen extraction when none is configured.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// HTTP backend timeout (seconds). Local CPU inference on long reports is slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Maximum length of a specimen comment, in characters.
pub const MAX_COMMENT_LENGTH: usize = 200;

/// Log filter applied when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "pathex=info,pathex_lib=info"
}

/// Which text-generation backend answers the prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Ollama HTTP API (`/api/generate`).
    Http,
    /// `ollama run <model>` subprocess, prompt on stdin.
    Cli,
}

/// Shape of the output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Fixed-width table, one row per subject.
    Csv,
    /// List of `{accession_number, specimens}` objects.
    Json,
}

impl OutputFormat {
    /// Guess the format from the output file extension, defaulting to CSV.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Resolved settings for one extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub output_format: OutputFormat,
    pub backend: BackendKind,
    pub model_name: String,
    pub ollama_url: String,
    pub timeout_secs: u64,
    pub max_comment_length: usize,
}

impl ExtractionConfig {
    /// Config with defaults for everything but the file paths.
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        let output_format = OutputFormat::from_path(&output_path);
        Self {
            input_path,
            output_path,
            output_format,
            backend: BackendKind::Http,
            model_name: DEFAULT_MODEL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_comment_length: MAX_COMMENT_LENGTH,
        }
    }
}
