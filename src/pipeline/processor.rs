//! Extraction run orchestrator.
//!
//! Single entry point that drives the full run:
//! load input → build backend → census + specimen passes per subject → write output.
//!
//! Input problems are fatal. Per-subject failures are not: they are logged,
//! counted in the [`BatchReport`], and replaced with the stub record.

use crate::config::{BackendKind, ExtractionConfig};
use crate::pipeline::batch_extraction::{BatchReport, BatchRunner, Subject};
use crate::pipeline::export::{write_batch, ExportError};
use crate::pipeline::import::{load_subjects, ImportError};
use crate::pipeline::structuring::{
    default_rules, BackendError, LlmClient, Normalizer, OllamaCliClient, OllamaClient,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Input failed: {0}")]
    Import(#[from] ImportError),

    #[error("Output failed: {0}")]
    Export(#[from] ExportError),

    #[error("Backend setup failed: {0}")]
    Backend(#[from] BackendError),
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run an extraction end to end with the backend named in `config`.
pub fn run_extraction(config: &ExtractionConfig) -> Result<BatchReport, PipelineError> {
    tracing::info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        backend = ?config.backend,
        model = %config.model_name,
        "Starting extraction run"
    );

    let subjects = load_subjects(&config.input_path)?;
    let llm = build_client(config)?;
    process_subjects(config, subjects, llm)
}

/// Run already-loaded subjects through `llm` and write the output artifact.
pub fn process_subjects(
    config: &ExtractionConfig,
    subjects: Vec<Subject>,
    llm: Box<dyn LlmClient>,
) -> Result<BatchReport, PipelineError> {
    let normalizer = Normalizer::new(default_rules(), config.max_comment_length);
    let runner = BatchRunner::new(llm, normalizer);
    let (batch, report) = runner.run(subjects);

    for degraded in &report.degraded {
        tracing::warn!(
            subject_id = %degraded.subject_id,
            kind = %degraded.kind,
            reason = %degraded.reason,
            "Subject degraded to stub record"
        );
    }

    write_batch(&batch, &config.output_path, config.output_format)?;
    Ok(report)
}

/// Construct the configured backend client.
pub fn build_client(config: &ExtractionConfig) -> Result<Box<dyn LlmClient>, PipelineError> {
    match config.backend {
        BackendKind::Http => {
            let client =
                OllamaClient::new(&config.ollama_url, &config.model_name, config.timeout_secs)?;
            preflight(&client);
            Ok(Box::new(client))
        }
        BackendKind::Cli => Ok(Box::new(OllamaCliClient::new(&config.model_name))),
    }
}

/// Warn early when the model is not available. Never fatal.
fn preflight(client: &OllamaClient) {
    match client.list_models() {
        Ok(models) if has_model(&models, client.model()) => {
            tracing::debug!(model = client.model(), "Model available");
        }
        Ok(models) => tracing::warn!(
            model = client.model(),
            available = ?models,
            "Model not found on Ollama instance, every report may degrade"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not list Ollama models"),
    }
}

/// `llama3.2` matches an installed `llama3.2:latest`.
fn has_model(models: &[String], wanted: &str) -> bool {
    models.iter().any(|name| {
        name == wanted
            || name
                .strip_prefix(wanted)
                .is_some_and(|tag| tag.starts_with(':'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::pipeline::structuring::ScriptedLlmClient;

    #[test]
    fn model_match_accepts_tag_suffix() {
        let models = vec!["llama3.2:latest".to_string(), "mistral:7b".to_string()];
        assert!(has_model(&models, "llama3.2"));
        assert!(has_model(&models, "mistral:7b"));
        assert!(!has_model(&models, "llama3"));
        assert!(!has_model(&[], "llama3.2"));
    }

    #[test]
    fn cli_backend_builds_without_network() {
        let mut config = ExtractionConfig::new("in.csv".into(), "out.csv".into());
        config.backend = BackendKind::Cli;
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn missing_input_aborts_before_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::new(dir.path().join("absent.csv"), dir.path().join("out.csv"));
        let err = run_extraction(&config).unwrap_err();
        assert!(matches!(err, PipelineError::Import(ImportError::NotFound(_))));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn process_subjects_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExtractionConfig::new("in.csv".into(), dir.path().join("out.json"));
        config.output_format = OutputFormat::Json;
        let llm = ScriptedLlmClient::new([
            Some(r#"{"number_of_specimens": 1, "specimen_names": ["left apex"]}"#),
            Some(r#"{"specimens": [{"gleason_pattern": "4+3"}]}"#),
        ]);

        let report = process_subjects(
            &config,
            vec![Subject::new(Some("S1"), "adenocarcinoma", 1)],
            Box::new(llm),
        )
        .unwrap();
        assert_eq!(report.subject_count, 1);
        assert_eq!(report.degraded_count(), 0);

        let text = std::fs::read_to_string(dir.path().join("out.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["specimens"][0]["specimen_name"], "left apex");
        assert_eq!(value[0]["specimens"][0]["gleason_score"], "7");
    }
}
