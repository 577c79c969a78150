//! OpenAI chat-completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{PromptQaError, Result};
use crate::llm::{send_with_rate_limit_retry, LlmClient, LLM_MAX_TOKENS, LLM_REQUEST_TIMEOUT};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub max_tokens: u32,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            max_tokens: LLM_MAX_TOKENS,
        }
    }
}

pub struct OpenAiClient {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(LLM_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| PromptQaError::Llm(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, config })
    }

    async fn invoke(&self, system: &str, user_content: Value) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0.0,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user_content },
            ],
        });

        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let request = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body);

        let raw = send_with_rate_limit_retry(request, "openai").await?;
        let response: ChatResponse = serde_json::from_str(&raw)
            .map_err(|err| PromptQaError::Llm(format!("openai response invalid: {err}")))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PromptQaError::Llm("openai response missing content".into()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        self.invoke(system, Value::String(user.to_string())).await
    }

    async fn generate_with_image(
        &self,
        system: &str,
        user: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String> {
        let content = json!([
            {
                "type": "image_url",
                "image_url": { "url": format!("data:{mime_type};base64,{image_base64}") },
            },
            { "type": "text", "text": user },
        ]);
        self.invoke(system, content).await
    }

    fn supports_vision(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
