//! Writes the run's output artifact: the unified CSV table or a JSON list.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::config::OutputFormat;
use crate::pipeline::batch_extraction::{unify, Batch, OutputTable};
use crate::pipeline::structuring::SpecimenRecord;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON write error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One subject in the JSON output.
#[derive(Debug, Serialize)]
pub struct SubjectOutput<'a> {
    pub accession_number: &'a str,
    pub specimens: &'a [SpecimenRecord],
}

/// Write the batch to `path` in the requested format.
pub fn write_batch(batch: &Batch, path: &Path, format: OutputFormat) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;

    match format {
        OutputFormat::Csv => {
            let table = unify(batch);
            write_table(&table, file)?;
            tracing::info!(
                file = %path.display(),
                rows = table.rows.len(),
                columns = table.width(),
                "Wrote output table"
            );
        }
        OutputFormat::Json => {
            write_json(batch, BufWriter::new(file))?;
            tracing::info!(file = %path.display(), subjects = batch.len(), "Wrote output JSON");
        }
    }
    Ok(())
}

/// Header row, then one row per subject.
pub fn write_table<W: Write>(table: &OutputTable, writer: W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&table.headers)?;
    for row in &table.rows {
        csv_writer.write_record(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Pretty-printed list of `{accession_number, specimens}`.
pub fn write_json<W: Write>(batch: &Batch, mut writer: W) -> Result<(), ExportError> {
    let subjects: Vec<SubjectOutput<'_>> = batch
        .subjects
        .iter()
        .map(|resolved| SubjectOutput {
            accession_number: &resolved.subject.subject_id,
            specimens: &resolved.specimens,
        })
        .collect();
    serde_json::to_writer_pretty(&mut writer, &subjects)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
