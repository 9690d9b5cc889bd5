//! Anthropic Messages API client.
//!
//! Thin HTTP wrapper for `/v1/messages`. PDFs go out as `document` blocks with
//! a base64 source. Pure parsing in `parse_response` for testability.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::config::LlmTimeouts;
use super::types::{ChatResponse, LlmError, Message, Part, Role};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

// =============================================================================
// CLIENT
// =============================================================================

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key })
    }

    pub async fn chat(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
    ) -> Result<ChatResponse, LlmError> {
        let body = build_request(model, max_tokens, system, messages);

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }

        parse_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text { text: String },
    Document { source: DocumentSource },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ResponseBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    /// Thinking, tool use and future block types are ignored.
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

// =============================================================================
// BUILD / PARSE
// =============================================================================

fn build_request<'a>(model: &'a str, max_tokens: u32, system: &'a str, messages: &[Message]) -> ApiRequest<'a> {
    let messages = messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m
                .parts
                .iter()
                .map(|p| match p {
                    Part::Text(text) => RequestBlock::Text { text: text.clone() },
                    Part::Document { media_type, data } => RequestBlock::Document {
                        source: DocumentSource { kind: "base64", media_type: media_type.clone(), data: BASE64.encode(data) },
                    },
                })
                .collect(),
        })
        .collect();

    ApiRequest { model, max_tokens, system, messages }
}

fn parse_response(json: &str) -> Result<ChatResponse, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let text = api
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            ResponseBlock::Unknown => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    let stop_reason = api.stop_reason.unwrap_or_else(|| "end_turn".into());

    if text.is_empty() {
        return Err(LlmError::EmptyCompletion(format!("stop reason {stop_reason}")));
    }

    Ok(ChatResponse {
        text,
        model: api.model,
        stop_reason,
        input_tokens: api.usage.input_tokens,
        output_tokens: api.usage.output_tokens,
    })
}

#[cfg(test)]
#[path = "anthropic_test.rs"]
mod tests;
