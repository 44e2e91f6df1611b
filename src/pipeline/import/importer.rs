use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::pipeline::batch_extraction::Subject;
use super::ImportError;

/// Column holding the subject identifier.
pub const ACCESSION_COLUMN: &str = "accession_number";

/// Column holding the raw report text.
pub const REPORT_COLUMN: &str = "report";

/// Load every subject from a CSV file with `accession_number` and `report` columns.
pub fn load_subjects(path: &Path) -> Result<Vec<Subject>, ImportError> {
    if !path.is_file() {
        return Err(ImportError::NotFound(path.to_path_buf()));
    }
    if std::fs::metadata(path)?.len() == 0 {
        return Err(ImportError::Empty(path.to_path_buf()));
    }

    tracing::info!(file = %path.display(), "Loading input reports");
    let subjects = read_subjects(File::open(path)?)?;
    if subjects.is_empty() {
        return Err(ImportError::Empty(path.to_path_buf()));
    }

    tracing::info!(count = subjects.len(), "Input reports loaded");
    Ok(subjects)
}

/// Read subjects from any CSV source. Extra columns are ignored.
///
/// Rows are numbered from 1 (first data row) for identifier fallback.
pub fn read_subjects<R: Read>(reader: R) -> Result<Vec<Subject>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let position = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or(ImportError::MissingColumn(name))
    };
    let accession_idx = position(ACCESSION_COLUMN)?;
    let report_idx = position(REPORT_COLUMN)?;

    let mut subjects = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = idx + 1;
        let report = record.get(report_idx).unwrap_or_default();
        if report.trim().is_empty() {
            tracing::warn!(line, "Report text is empty");
        }
        subjects.push(Subject::new(record.get(accession_idx), report, line));
    }

    Ok(subjects)
}
