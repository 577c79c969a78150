//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{PromptQaError, Result};
use crate::llm::{send_with_rate_limit_retry, LlmClient, LLM_MAX_TOKENS, LLM_REQUEST_TIMEOUT};

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub max_tokens: u32,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_base: "https://api.anthropic.com/v1".to_string(),
            max_tokens: LLM_MAX_TOKENS,
        }
    }
}

pub struct AnthropicClient {
    http: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(LLM_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| PromptQaError::Llm(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, config })
    }

    async fn invoke(&self, system: &str, content: Vec<ContentBlock>) -> Result<String> {
        let body = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
        };

        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));
        let request = self
            .http
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let raw = send_with_rate_limit_retry(request, "anthropic").await?;
        let response: MessagesResponse = serde_json::from_str(&raw)
            .map_err(|err| PromptQaError::Llm(format!("anthropic response invalid: {err}")))?;

        let text = response
            .content
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Err(PromptQaError::Llm("anthropic response missing content".into()));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        self.invoke(system, vec![ContentBlock::text(user)]).await
    }

    async fn generate_with_image(
        &self,
        system: &str,
        user: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String> {
        self.invoke(
            system,
            vec![
                ContentBlock::image(image_base64, mime_type),
                ContentBlock::text(user),
            ],
        )
        .await
    }

    fn supports_vision(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    fn text(text: &str) -> Self {
        ContentBlock::Text {
            text: text.to_string(),
        }
    }

    fn image(data: &str, media_type: &str) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: media_type.to_string(),
                data: data.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_image_blocks() {
        let body = MessagesRequest {
            model: "m".into(),
            max_tokens: 16,
            system: "s".into(),
            messages: vec![Message {
                role: "user".into(),
                content: vec![
                    ContentBlock::image("aGVsbG8=", "image/png"),
                    ContentBlock::text("describe"),
                ],
            }],
        };
        let raw = serde_json::to_value(&body).unwrap();
        assert_eq!(raw["messages"][0]["content"][0]["type"], "image");
        assert_eq!(
            raw["messages"][0]["content"][0]["source"]["media_type"],
            "image/png"
        );
        assert_eq!(raw["messages"][0]["content"][1]["text"], "describe");
    }
}
