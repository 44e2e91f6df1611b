pub mod import;
pub mod structuring;
pub mod batch_extraction;
pub mod export;
pub mod processor; // Extraction run orchestrator
