//! Drives census → extraction → normalization for each subject.
//!
//! Runs sequentially (one backend call at a time). A failure for one subject
//! degrades it to the stub record; it never aborts the batch.

use std::time::Instant;

use super::types::*;
use crate::pipeline::structuring::{
    build_census_prompt, build_specimen_prompt, parse_census_response, parse_json_reply,
    LlmClient, Normalizer, SpecimenCensus, SpecimenRecord, StructuringError,
};

/// Orchestrates a full extraction batch run.
pub struct BatchRunner {
    llm: Box<dyn LlmClient>,
    normalizer: Normalizer,
}

/// Outcome of one subject, before it joins the batch.
#[derive(Debug)]
pub struct SubjectExtraction {
    pub resolved: ResolvedSubject,
    pub failure: Option<StructuringError>,
    /// Backend reply that could not be used, kept for the run report.
    pub raw_reply: Option<String>,
    pub census_fallback: bool,
}

impl BatchRunner {
    pub fn new(llm: Box<dyn LlmClient>, normalizer: Normalizer) -> Self {
        Self { llm, normalizer }
    }

    /// Process every subject in order and collect the batch.
    pub fn run(&self, subjects: Vec<Subject>) -> (Batch, BatchReport) {
        let start = Instant::now();
        let total = subjects.len();
        let mut batch = Batch::default();
        let mut report = BatchReport {
            subject_count: total,
            ..BatchReport::default()
        };

        for (idx, subject) in subjects.into_iter().enumerate() {
            tracing::info!(
                subject_id = %subject.subject_id,
                position = idx + 1,
                total,
                "Processing report"
            );

            let extraction = self.extract_subject(subject);
            if extraction.census_fallback {
                report.census_fallbacks += 1;
            }
            if let Some(failure) = &extraction.failure {
                report.degraded.push(DegradedSubject {
                    subject_id: extraction.resolved.subject.subject_id.clone(),
                    kind: failure.kind().to_string(),
                    reason: failure.to_string(),
                    raw_reply: extraction.raw_reply.clone(),
                });
            }
            report.specimen_count += extraction.resolved.specimens.len();
            batch.subjects.push(extraction.resolved);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            subjects = report.subject_count,
            specimens = report.specimen_count,
            degraded = report.degraded_count(),
            duration_ms = report.duration_ms,
            "Batch extraction complete"
        );

        (batch, report)
    }

    /// Run both passes for one subject. Always yields at least one record.
    pub fn extract_subject(&self, subject: Subject) -> SubjectExtraction {
        let (census, census_fallback) = match self.take_census(&subject) {
            Ok(census) => (census, false),
            Err(e) => {
                tracing::warn!(
                    subject_id = %subject.subject_id,
                    kind = e.kind(),
                    error = %e,
                    "Specimen census failed, assuming one unnamed specimen"
                );
                (SpecimenCensus::default(), true)
            }
        };

        let (specimens, failure, raw_reply) = match self.extract_specimens(&subject, &census) {
            Ok(specimens) => (specimens, None, None),
            Err((e, raw_reply)) => {
                log_degraded(&subject, &e, raw_reply.as_deref());
                let stub = self.normalizer.stub_records(&subject.report_text);
                (stub, Some(e), raw_reply)
            }
        };

        SubjectExtraction {
            resolved: ResolvedSubject { subject, specimens },
            failure,
            raw_reply,
            census_fallback,
        }
    }

    fn take_census(&self, subject: &Subject) -> Result<SpecimenCensus, StructuringError> {
        let raw = self.llm.generate(&build_census_prompt(&subject.report_text))?;
        tracing::debug!(subject_id = %subject.subject_id, raw = %raw, "Census reply");
        parse_census_response(&raw)
    }

    /// On failure, also hands back the reply when the backend produced one.
    fn extract_specimens(
        &self,
        subject: &Subject,
        census: &SpecimenCensus,
    ) -> Result<Vec<SpecimenRecord>, (StructuringError, Option<String>)> {
        let prompt = build_specimen_prompt(&subject.report_text, census);
        let raw = self
            .llm
            .generate(&prompt)
            .map_err(|e| (StructuringError::from(e), None))?;
        tracing::debug!(subject_id = %subject.subject_id, raw = %raw, "Specimen reply");

        self.interpret_reply(subject, census, &raw)
            .map_err(|e| (e, Some(raw)))
    }

    fn interpret_reply(
        &self,
        subject: &Subject,
        census: &SpecimenCensus,
        raw: &str,
    ) -> Result<Vec<SpecimenRecord>, StructuringError> {
        let payload = parse_json_reply(raw)?;
        let records = self
            .normalizer
            .normalize(&payload, &subject.report_text, &census.names)?;
        Ok(records)
    }
}

fn log_degraded(subject: &Subject, error: &StructuringError, raw_reply: Option<&str>) {
    match (error, raw_reply) {
        (StructuringError::Parse(failure), Some(raw)) => tracing::warn!(
            subject_id = %subject.subject_id,
            kind = error.kind(),
            tag = failure.tag(),
            raw = %raw,
            repaired = ?failure.raw_text(),
            "No valid data extracted, substituting stub record"
        ),
        (_, Some(raw)) => tracing::warn!(
            subject_id = %subject.subject_id,
            kind = error.kind(),
            error = %error,
            raw = %raw,
            "No valid data extracted, substituting stub record"
        ),
        (_, None) => tracing::warn!(
            subject_id = %subject.subject_id,
            kind = error.kind(),
            error = %error,
            "No valid data extracted, substituting stub record"
        ),
    }
}
