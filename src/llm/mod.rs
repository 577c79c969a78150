//! LLM clients.
//!
//! Every LLM call in the tool goes through [`LlmClient`]; the planner,
//! evaluator and agent never see a transport. Rate-limit retry lives here
//! so both HTTP providers share it.

pub mod anthropic;
pub mod extract;
pub mod mock;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::{PromptQaError, Result};

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use mock::MockClient;
pub use openai::{OpenAiClient, OpenAiConfig};

/// Attempts per request before a rate limit becomes an error.
const LLM_MAX_ATTEMPTS: u32 = 3;
/// Per-request transport timeout.
pub(crate) const LLM_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Completion budget for every call.
pub(crate) const LLM_MAX_TOKENS: u32 = 2_048;

/// Two-method boundary to the model provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String>;

    /// Image-capable variant. Providers without vision fall back to text.
    async fn generate_with_image(
        &self,
        system: &str,
        user: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String> {
        let _ = (image_base64, mime_type);
        self.generate(system, user).await
    }

    fn supports_vision(&self) -> bool {
        false
    }
}

/// Build a client from `LLM_PROVIDER` and the provider key/model variables,
/// with optional config-level overrides.
pub fn client_from_env(
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LlmClient>> {
    let provider = provider
        .map(str::to_string)
        .or_else(|| std::env::var("LLM_PROVIDER").ok())
        .unwrap_or_else(|| "anthropic".to_string());

    match provider.as_str() {
        "anthropic" => {
            let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
                PromptQaError::Config("ANTHROPIC_API_KEY is not set".into())
            })?;
            let mut config = AnthropicConfig::new(api_key);
            if let Some(model) = model
                .map(str::to_string)
                .or_else(|| std::env::var("PROMPTQA_MODEL").ok())
            {
                config.model = model;
            }
            Ok(Arc::new(AnthropicClient::new(config)?))
        }
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| PromptQaError::Config("OPENAI_API_KEY is not set".into()))?;
            let mut config = OpenAiConfig::new(api_key);
            if let Some(model) = model
                .map(str::to_string)
                .or_else(|| std::env::var("LLM_MODEL").ok())
            {
                config.model = model;
            }
            Ok(Arc::new(OpenAiClient::new(config)?))
        }
        "mock" => Ok(Arc::new(MockClient::from_env()?)),
        other => Err(PromptQaError::Config(format!(
            "unknown LLM provider '{other}' (expected anthropic, openai, or mock)"
        ))),
    }
}

/// Send a request, retrying on HTTP 429 or a provider-typed rate-limit error
/// with `Retry-After` or a 5s * (attempt + 1) backoff. Other failures
/// propagate immediately. Returns the raw response body.
pub(crate) async fn send_with_rate_limit_retry(
    builder: reqwest::RequestBuilder,
    provider: &str,
) -> Result<String> {
    let mut attempt = 0u32;
    loop {
        let request = builder.try_clone().ok_or_else(|| {
            PromptQaError::Llm(format!("{provider} request could not be cloned for retry"))
        })?;
        let response = request
            .send()
            .await
            .map_err(|err| PromptQaError::Llm(format!("{provider} request failed: {err}")))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|err| PromptQaError::Llm(format!("{provider} response unreadable: {err}")))?;

        if status.is_success() {
            return Ok(body);
        }

        let rate_limited = status.as_u16() == 429 || body.contains("rate_limit_error");
        attempt += 1;
        if rate_limited && attempt < LLM_MAX_ATTEMPTS {
            let wait = retry_after
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(5 * u64::from(attempt)));
            warn!(provider, attempt, wait_secs = wait.as_secs(), "rate limited, backing off");
            tokio::time::sleep(wait).await;
            continue;
        }

        return Err(PromptQaError::Llm(format!(
            "{provider} returned {status}: {body}"
        )));
    }
}
