pub mod importer;

pub use importer::*;

use std::path::PathBuf;

use thiserror::Error;

/// Input problems. All of them abort the run before any report is processed.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),

    #[error("Input file is empty: {0}")]
    Empty(PathBuf),

    #[error("Input is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("Could not parse input table: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
