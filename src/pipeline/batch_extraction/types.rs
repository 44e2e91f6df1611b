//! Core types for one batch run: subjects in, resolved specimen lists out.

use serde::Serialize;

use crate::pipeline::structuring::SpecimenRecord;

/// One input report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub subject_id: String,
    pub report_text: String,
}

impl Subject {
    /// `line` is the 1-based data row, used when the accession number is blank.
    pub fn new(accession_number: Option<&str>, report_text: &str, line: usize) -> Self {
        let subject_id = accession_number
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("subject_{line}"));
        Self {
            subject_id,
            report_text: report_text.to_string(),
        }
    }
}

/// A subject with its finalized specimen list (never empty).
#[derive(Debug, Clone)]
pub struct ResolvedSubject {
    pub subject: Subject,
    pub specimens: Vec<SpecimenRecord>,
}

/// All subjects of one run, in input order.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub subjects: Vec<ResolvedSubject>,
}

impl Batch {
    /// Widest specimen list in the batch; sets the table width.
    pub fn max_specimen_count(&self) -> usize {
        self.subjects
            .iter()
            .map(|s| s.specimens.len())
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

/// A subject whose extraction degraded to the stub record.
#[derive(Debug, Clone, Serialize)]
pub struct DegradedSubject {
    pub subject_id: String,
    /// `backend_invocation_failure`, `parse_failure`, or `schema_mismatch`.
    pub kind: String,
    pub reason: String,
    /// The unusable reply, absent when the backend call itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_reply: Option<String>,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub subject_count: usize,
    pub specimen_count: usize,
    pub degraded: Vec<DegradedSubject>,
    /// Subjects whose census pass failed and fell back to one unnamed specimen.
    pub census_fallbacks: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn degraded_count(&self) -> usize {
        self.degraded.len()
    }
}
