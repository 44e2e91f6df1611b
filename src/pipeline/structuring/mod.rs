//! Turns one backend reply into normalized specimen records.
//!
//! ```text
//! raw reply → sanitize (fences) → repair (span, brackets, commas) → parse
//!           → normalize (defaults, override rules, comment cap)
//! ```
//!
//! Every stage after the backend call is a pure function. Failures are
//! returned as values so the batch layer can substitute a stub record.

pub mod types;
pub mod prompt;
pub mod sanitize;
pub mod repair;
pub mod normalize;
pub mod parser;
pub mod ollama;

pub use types::*;
pub use prompt::*;
pub use sanitize::*;
pub use repair::*;
pub use normalize::*;
pub use parser::*;
pub use ollama::*;

use thiserror::Error;

/// The text-generation backend could not produce a reply.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Ollama is not running at {0}")]
    Connection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Backend process error: {0}")]
    Process(String),

    #[error("Empty response from backend")]
    EmptyResponse,

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// Why a subject's extraction degraded to the stub record.
#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("backend invocation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("parse failure: {0}")]
    Parse(#[from] ParseFailure),

    #[error(transparent)]
    Schema(#[from] SchemaMismatch),
}

impl StructuringError {
    /// Short tag for logs and the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Backend(_) => "backend_invocation_failure",
            Self::Parse(_) => "parse_failure",
            Self::Schema(_) => "schema_mismatch",
        }
    }
}
