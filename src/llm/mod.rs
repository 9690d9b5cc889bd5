//! LLM — provider adapter for document-grounded chat.
//!
//! DESIGN
//! ======
//! `LlmClient` dispatches to Gemini or Anthropic based on `LLM_PROVIDER`.
//! Every call goes through the bounded retry in [`retry`]. Callers depend on
//! the [`types::LlmChat`] trait so tests can swap in a scripted mock.

pub mod anthropic;
pub mod config;
pub mod gemini;
pub mod retry;
pub mod types;

use config::{LlmConfig, LlmProviderKind, RetryPolicy};
use types::{ChatResponse, LlmChat, LlmError, Message};

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

enum Provider {
    Gemini(gemini::GeminiClient),
    Anthropic(anthropic::AnthropicClient),
}

pub struct LlmClient {
    provider: Provider,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Build an LLM client from environment variables. See [`LlmConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_config(LlmConfig::from_env()?)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let provider = match config.provider {
            LlmProviderKind::Gemini => Provider::Gemini(gemini::GeminiClient::new(config.api_key, config.timeouts)?),
            LlmProviderKind::Anthropic => {
                Provider::Anthropic(anthropic::AnthropicClient::new(config.api_key, config.timeouts)?)
            }
        };
        Ok(Self { provider, model: config.model, max_tokens: config.max_tokens, retry: config.retry })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        let started = std::time::Instant::now();
        let response = retry::with_retry(self.retry, || async {
            match &self.provider {
                Provider::Gemini(c) => c.chat(&self.model, max_tokens, system, messages).await,
                Provider::Anthropic(c) => c.chat(&self.model, max_tokens, system, messages).await,
            }
        })
        .await?;

        tracing::info!(
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            stop_reason = %response.stop_reason,
            elapsed_ms = started.elapsed().as_millis(),
            "llm: completion"
        );
        Ok(response)
    }
}
