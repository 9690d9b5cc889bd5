//! LLM configuration parsed from environment variables.

use super::types::LlmError;

pub const DEFAULT_LLM_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LLM_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_LLM_RETRY_INITIAL_MS: u64 = 250;
pub const DEFAULT_LLM_RETRY_MAX_ELAPSED_SECS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Gemini,
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Shape of the bounded retry around each provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retry.
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_elapsed_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_LLM_RETRY_MAX_ATTEMPTS,
            initial_interval_ms: DEFAULT_LLM_RETRY_INITIAL_MS,
            max_elapsed_secs: DEFAULT_LLM_RETRY_MAX_ELAPSED_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeouts: LlmTimeouts,
    pub retry: RetryPolicy,
}

impl LlmConfig {
    /// Build typed LLM config from environment variables.
    ///
    /// Required:
    /// - `LLM_API_KEY_ENV` (names the env var containing the key, e.g. `GEMINI_API_KEY`)
    ///
    /// Optional:
    /// - `LLM_PROVIDER`: `gemini` (default) or `anthropic`
    /// - `LLM_MODEL`: provider default when absent
    /// - `LLM_MAX_TOKENS`: default 4096
    /// - `LLM_REQUEST_TIMEOUT_SECS` / `LLM_CONNECT_TIMEOUT_SECS`: default 120 / 10
    /// - `LLM_RETRY_MAX_ATTEMPTS`, `LLM_RETRY_INITIAL_MS`, `LLM_RETRY_MAX_ELAPSED_SECS`
    pub fn from_env() -> Result<Self, LlmError> {
        let provider = parse_provider(std::env::var("LLM_PROVIDER").ok().as_deref())?;

        let key_var =
            std::env::var("LLM_API_KEY_ENV").map_err(|_| LlmError::MissingApiKey { var: "LLM_API_KEY_ENV".into() })?;
        let api_key = std::env::var(&key_var).map_err(|_| LlmError::MissingApiKey { var: key_var.clone() })?;

        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| default_model(provider).to_string());
        let timeouts = LlmTimeouts {
            request_secs: env_parse("LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
        };
        let retry = RetryPolicy {
            max_attempts: env_parse("LLM_RETRY_MAX_ATTEMPTS", DEFAULT_LLM_RETRY_MAX_ATTEMPTS).max(1),
            initial_interval_ms: env_parse("LLM_RETRY_INITIAL_MS", DEFAULT_LLM_RETRY_INITIAL_MS),
            max_elapsed_secs: env_parse("LLM_RETRY_MAX_ELAPSED_SECS", DEFAULT_LLM_RETRY_MAX_ELAPSED_SECS),
        };

        Ok(Self {
            provider,
            api_key,
            model,
            max_tokens: env_parse("LLM_MAX_TOKENS", DEFAULT_LLM_MAX_TOKENS),
            timeouts,
            retry,
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_provider(raw: Option<&str>) -> Result<LlmProviderKind, LlmError> {
    match raw.unwrap_or("gemini") {
        "gemini" => Ok(LlmProviderKind::Gemini),
        "anthropic" => Ok(LlmProviderKind::Anthropic),
        other => Err(LlmError::ConfigParse(format!("unknown LLM_PROVIDER: {other}"))),
    }
}

fn default_model(provider: LlmProviderKind) -> &'static str {
    match provider {
        LlmProviderKind::Gemini => "gemini-2.0-flash",
        LlmProviderKind::Anthropic => "claude-sonnet-4-5-20250929",
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
