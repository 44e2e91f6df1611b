use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pathex_lib::config::{self, BackendKind, ExtractionConfig, OutputFormat};
use pathex_lib::pipeline::processor::run_extraction;

#[derive(Parser, Debug)]
#[command(
    name = "pathex",
    about = "Extract specimen fields from pathology reports into a fixed-width table",
    version
)]
struct Cli {
    /// CSV with `accession_number` and `report` columns
    input: PathBuf,

    /// Output file (.csv table or .json list)
    output: PathBuf,

    /// Output format (defaults to the output file extension)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Text-generation backend
    #[arg(long, value_enum, env = "PATHEX_BACKEND", default_value_t = BackendKind::Http)]
    backend: BackendKind,

    /// Model name passed to Ollama
    #[arg(long, env = "PATHEX_MODEL", default_value = config::DEFAULT_MODEL)]
    model: String,

    /// Ollama base URL (HTTP backend only)
    #[arg(long, env = "PATHEX_OLLAMA_URL", default_value = config::DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// Per-request timeout in seconds (HTTP backend only)
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Maximum comment length in characters
    #[arg(long, default_value_t = config::MAX_COMMENT_LENGTH)]
    max_comment_length: usize,

    /// Tracing filter, e.g. `pathex_lib=debug` (overrides RUST_LOG)
    #[arg(long)]
    log_filter: Option<String>,
}

impl Cli {
    fn into_config(self) -> ExtractionConfig {
        let mut config = ExtractionConfig::new(self.input, self.output);
        if let Some(format) = self.format {
            config.output_format = format;
        }
        config.backend = self.backend;
        config.model_name = self.model;
        config.ollama_url = self.ollama_url;
        config.timeout_secs = self.timeout_secs;
        config.max_comment_length = self.max_comment_length;
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    pathex_lib::init_tracing(cli.log_filter.as_deref());
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = cli.into_config();
    match run_extraction(&config) {
        Ok(report) => {
            tracing::info!(
                subjects = report.subject_count,
                specimens = report.specimen_count,
                degraded = report.degraded_count(),
                census_fallbacks = report.census_fallbacks,
                duration_ms = report.duration_ms,
                output = %config.output_path.display(),
                "Extraction finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Extraction run failed");
            ExitCode::FAILURE
        }
    }
}
