//! Projects a batch of variable-length specimen lists onto one fixed-width table.

use serde::Serialize;

use super::types::Batch;
use crate::pipeline::structuring::SpecimenRecord;

/// Header of the identity column.
pub const IDENTITY_HEADER: &str = "StudyID";

/// Per-slot column prefixes, in block order.
pub const BLOCK_HEADERS: [&str; 11] = [
    "Specimen", "GS", "GP", "#C", "%Spec", "HGPIN", "ASAP", "ATYP", "INF", "ADC", "Comment",
];

pub const BLOCK_WIDTH: usize = BLOCK_HEADERS.len();

/// Rectangular output: every row has `headers.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    /// Number of specimen blocks per row.
    pub fn slot_count(&self) -> usize {
        (self.headers.len() - 1) / BLOCK_WIDTH
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

/// Headers for `slots` specimen blocks: `StudyID, Specimen_1, GS_1, …`.
pub fn build_headers(slots: usize) -> Vec<String> {
    let mut headers = Vec::with_capacity(1 + BLOCK_WIDTH * slots);
    headers.push(IDENTITY_HEADER.to_string());
    for slot in 1..=slots {
        headers.extend(BLOCK_HEADERS.iter().map(|prefix| format!("{prefix}_{slot}")));
    }
    headers
}

/// One specimen's 11 cells in block order.
pub fn specimen_cells(record: &SpecimenRecord) -> [String; BLOCK_WIDTH] {
    let flag = |present: bool| String::from(if present { "1" } else { "0" });
    let f = &record.features;
    [
        record.specimen_name.clone(),
        record.gleason_score.clone(),
        record.gleason_pattern.clone(),
        record.num_cores.clone(),
        record.percent_specimen.clone(),
        flag(f.hgpin),
        flag(f.asap),
        flag(f.atyp),
        flag(f.inf),
        flag(f.adc),
        record.comment.clone(),
    ]
}

/// Flatten the batch. Width is set by the subject with the most specimens;
/// shorter lists are padded with empty cells.
pub fn unify(batch: &Batch) -> OutputTable {
    let slots = batch.max_specimen_count();
    let headers = build_headers(slots);

    let rows = batch
        .subjects
        .iter()
        .map(|resolved| {
            let mut row = Vec::with_capacity(headers.len());
            row.push(resolved.subject.subject_id.clone());
            for record in &resolved.specimens {
                row.extend(specimen_cells(record));
            }
            row.resize(headers.len(), String::new());
            row
        })
        .collect();

    OutputTable { headers, rows }
}
