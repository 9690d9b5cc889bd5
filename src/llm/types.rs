//! LLM types — provider-neutral message types and errors.
//!
//! Shared by the Gemini and Anthropic clients. Document parts carry raw bytes;
//! each provider encodes them for its own wire format.

use crate::error::ErrorCode;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The required API key environment variable is not set.
    #[error("missing API key: env var {var} not set")]
    MissingApiKey { var: String },

    /// The HTTP request to the LLM provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The LLM provider returned a non-success HTTP status.
    #[error("API response error: status {status}: {body}")]
    ApiResponse { status: u16, body: String },

    /// The LLM provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The provider answered but produced no text (e.g. safety block).
    #[error("empty completion: {0}")]
    EmptyCompletion(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for LlmError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::MissingApiKey { .. } => "E_MISSING_API_KEY",
            Self::ApiRequest(_) => "E_API_REQUEST",
            Self::ApiResponse { .. } => "E_API_RESPONSE",
            Self::ApiParse(_) => "E_API_PARSE",
            Self::EmptyCompletion(_) => "E_EMPTY_COMPLETION",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One ordered part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// A plain text segment.
    Text(String),
    /// A binary document attached inline, tagged with its MIME type.
    Document { media_type: String, data: Vec<u8> },
}

impl Part {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    #[must_use]
    pub fn user(parts: Vec<Part>) -> Self {
        Self { role: Role::User, parts }
    }
}

/// Response from an LLM chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub stop_reason: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// =============================================================================
// LLM CHAT TRAIT
// =============================================================================

/// Provider-neutral async trait for LLM chat. Enables mocking in tests.
#[async_trait::async_trait]
pub trait LlmChat: Send + Sync {
    /// Send a chat request to the LLM provider.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request fails or the response is malformed.
    async fn chat(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
