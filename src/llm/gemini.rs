//! Gemini `generateContent` client.
//!
//! Thin HTTP wrapper. Documents travel as `inlineData` parts (base64) in the
//! same turn as the text that refers to them. Request building and response
//! parsing are pure functions for testability.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::config::LlmTimeouts;
use super::types::{ChatResponse, LlmError, Message, Part, Role};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// =============================================================================
// CLIENT
// =============================================================================

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
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
        let body = build_request(max_tokens, system, messages);
        let url = format!("{API_BASE}/models/{model}:generateContent");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        parse_response(&text, model)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    /// Anything else the API may return (function calls, thoughts metadata).
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// =============================================================================
// BUILD / PARSE
// =============================================================================

fn build_request(max_tokens: u32, system: &str, messages: &[Message]) -> GenerateContentRequest {
    let system_instruction = (!system.is_empty())
        .then(|| WireContent { role: None, parts: vec![WirePart::Text { text: system.to_owned() }] });

    let contents = messages
        .iter()
        .map(|m| WireContent {
            role: Some(
                match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }
                .to_owned(),
            ),
            parts: m.parts.iter().map(to_wire_part).collect(),
        })
        .collect();

    GenerateContentRequest {
        system_instruction,
        contents,
        generation_config: GenerationConfig { max_output_tokens: max_tokens },
    }
}

fn to_wire_part(part: &Part) -> WirePart {
    match part {
        Part::Text(text) => WirePart::Text { text: text.clone() },
        Part::Document { media_type, data } => WirePart::InlineData {
            inline_data: InlineData { mime_type: media_type.clone(), data: BASE64.encode(data) },
        },
    }
}

fn parse_response(json: &str, requested_model: &str) -> Result<ChatResponse, LlmError> {
    let api: GenerateContentResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    if let Some(reason) = api.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::EmptyCompletion(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = api.candidates.into_iter().next() else {
        return Err(LlmError::EmptyCompletion("no candidates returned".into()));
    };

    let stop_reason = candidate.finish_reason.unwrap_or_else(|| "STOP".into());
    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| match p {
                    WirePart::Text { text } => Some(text),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::EmptyCompletion(format!("finish reason {stop_reason}")));
    }

    let usage = api.usage_metadata.unwrap_or_default();
    Ok(ChatResponse {
        text,
        model: api.model_version.unwrap_or_else(|| requested_model.to_owned()),
        stop_reason,
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
    })
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
