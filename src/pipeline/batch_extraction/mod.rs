//! Batch extraction: one pass over every input report.
//!
//! ```text
//! Subject → census pass → specimen pass → normalize ─┐
//!   (failure at any step → stub record)               ├→ Batch → unify → OutputTable
//! Subject → …                                        ─┘
//! ```
//!
//! Subjects run sequentially. A degraded subject still owns one record so the
//! table keeps its shape.

pub mod types;
pub mod runner;
pub mod table;

pub use types::*;
pub use runner::{BatchRunner, SubjectExtraction};
pub use table::{build_headers, specimen_cells, unify, OutputTable, BLOCK_WIDTH};
