use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::BackendError;

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a new OllamaClient pointing at an Ollama instance.
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models the Ollama instance has pulled.
    pub fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| BackendError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_connect() {
            BackendError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            BackendError::Timeout(self.timeout_secs)
        } else {
            BackendError::Http(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| BackendError::ResponseParsing(e.to_string()))?;

        if parsed.response.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(parsed.response)
    }
}

/// Runs `ollama run <model>` per prompt, prompt on stdin, reply on stdout.
pub struct OllamaCliClient {
    program: String,
    model: String,
}

impl OllamaCliClient {
    pub fn new(model: &str) -> Self {
        Self::with_program("ollama", model)
    }

    /// Use a different executable (tests, wrappers, non-PATH installs).
    pub fn with_program(program: &str, model: &str) -> Self {
        Self {
            program: program.to_string(),
            model: model.to_string(),
        }
    }
}

impl LlmClient for OllamaCliClient {
    fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let mut child = Command::new(&self.program)
            .arg("run")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::Process(format!("failed to start {}: {e}", self.program)))?;

        // Feed stdin from a separate thread so a large reply cannot deadlock the pipes.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            std::thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| BackendError::Process(e.to_string()))?;

        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Backend closed stdin early"),
                Err(_) => return Err(BackendError::Process("stdin writer panicked".into())),
            }
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(BackendError::Process(format!(
                "{} exited with {}: {stderr}",
                self.program, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            if !stderr.is_empty() {
                return Err(BackendError::Process(stderr));
            }
            return Err(BackendError::EmptyResponse);
        }
        if !stderr.is_empty() {
            tracing::debug!(stderr = %stderr, "Backend wrote to stderr");
        }
        Ok(stdout)
    }
}

/// Mock LLM client for testing — returns a configurable response.
pub struct MockLlmClient {
    response: String,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        Ok(self.response.clone())
    }
}

/// Scripted fake: replies are handed out in order, one per call.
///
/// `None` entries simulate an invocation failure. Once the script runs
/// out every call fails. Prompts are recorded for assertions.
pub struct ScriptedLlmClient {
    replies: RefCell<VecDeque<Option<String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl LlmClient for ScriptedLlmClient {
    fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.replies.borrow_mut().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(BackendError::Process("scripted failure".into())),
            None => Err(BackendError::Process("script exhausted".into())),
        }
    }
}
