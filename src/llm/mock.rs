//! Canned-response client for tests and scripted runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{PromptQaError, Result};
use crate::llm::LlmClient;

/// Environment variable holding a JSON array of canned responses, either
/// inline or as a path to a JSON file.
pub const MOCK_RESPONSES_VAR: &str = "PROMPTQA_MOCK_RESPONSES";

/// Cycles through a fixed list of responses, one per `generate` call.
pub struct MockClient {
    responses: Vec<String>,
    cursor: AtomicUsize,
}

impl MockClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(MOCK_RESPONSES_VAR).map_err(|_| {
            PromptQaError::Config(format!(
                "{MOCK_RESPONSES_VAR} must be set when LLM_PROVIDER=mock"
            ))
        })?;
        let raw = if raw.trim_start().starts_with('[') {
            raw
        } else {
            std::fs::read_to_string(raw.trim()).map_err(|err| {
                PromptQaError::Config(format!("cannot read mock responses file: {err}"))
            })?
        };
        let values: Vec<Value> = serde_json::from_str(&raw).map_err(|err| {
            PromptQaError::Config(format!("mock responses must be a JSON array: {err}"))
        })?;
        let responses = values
            .into_iter()
            .map(|value| match value {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect();
        Ok(Self::new(responses))
    }

    /// How many responses were consumed so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
        if self.responses.is_empty() {
            return Err(PromptQaError::Llm("mock client has no responses".into()));
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.responses.len();
        Ok(self.responses[index].clone())
    }
}
