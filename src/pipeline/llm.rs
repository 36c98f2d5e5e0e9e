//! Vision-model transport: OpenAI-compatible chat completions with retry.
//!
//! This module owns the HTTP client, the wire types, and the retry loop —
//! nothing else. Prompt assembly lives with the pipeline stage that needs it
//! ([`crate::pipeline::ocr`] for the fallback transcription,
//! [`crate::pipeline::extract`] for the schema-constrained call), so transport
//! concerns never mix with cataloging ones.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from model APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with the 500 ms base and the default single retry
//! a failed call waits 500 ms and tries once more, then degrades per the
//! stage's contract. Every request also carries a hard client-side timeout,
//! so a hung connection cannot stall a batch worker indefinitely.

use crate::config::PipelineConfig;
use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Official endpoint, used when `PipelineConfig::api_base` is unset.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

// ── Wire types ───────────────────────────────────────────────────────────

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// One conversation turn. Vision turns carry content parts; plain turns a
/// bare string — the untagged enum serialises whichever the turn holds.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One element of a multi-part user message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(data_url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: data_url.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// `response_format` block requesting schema-constrained generation.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

impl ResponseFormat {
    /// Strict `json_schema` constraint, the only mode this pipeline uses.
    pub fn strict_schema(name: impl Into<String>, schema: Value) -> Self {
        Self {
            format_type: "json_schema",
            json_schema: JsonSchemaFormat {
                name: name.into(),
                strict: true,
                schema,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    // Null on refusals and some filtered responses.
    content: Option<String>,
}

/// Token usage statistics, when the endpoint reports them.
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completed call: the assistant text (empty if the API returned null
/// content) plus usage numbers for logging.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<Usage>,
}

/// Transport-layer failure. Never escapes the pipeline: both call sites
/// degrade in place and log instead.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API call timed out after {0}s")]
    Timeout(u64),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("response contained no choices")]
    EmptyResponse,
}

// ── Client ───────────────────────────────────────────────────────────────

/// Minimal client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

impl VisionClient {
    /// Build a client with an explicit key and endpoint.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CatalogError::Internal(format!("building HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url,
            timeout_secs,
        })
    }

    /// Build a client from `OPENAI_API_KEY` and the configured endpoint.
    ///
    /// A missing key is a fatal, batch-level condition — failing here, before
    /// any document is touched, beats failing identically once per document.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, CatalogError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CatalogError::ApiNotConfigured {
                hint: "Set the OPENAI_API_KEY environment variable.\n\
                       Any OpenAI-compatible endpoint works — point --api-base at it."
                    .into(),
            })?;
        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::new(api_key, base_url, config.api_timeout_secs)
    }

    /// Issue one chat completion.
    async fn call(&self, request: &ChatRequest) -> Result<ChatReply, LlmError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: truncate_for_log(&body, 400),
            });
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("decoding response: {e}")))?;

        let choice = raw.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;
        Ok(ChatReply {
            content: choice.message.content.unwrap_or_default(),
            usage: raw.usage,
        })
    }

    /// Issue a chat completion with the configured retry policy.
    ///
    /// `label` names the document in log lines so concurrent workers stay
    /// distinguishable.
    pub async fn call_with_retry(
        &self,
        request: &ChatRequest,
        label: &str,
        config: &PipelineConfig,
    ) -> Result<ChatReply, LlmError> {
        let mut last_err = LlmError::EmptyResponse;

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    label, attempt, config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.call(request).await {
                Ok(reply) => {
                    if let Some(usage) = &reply.usage {
                        debug!(
                            "{}: {} input tokens, {} output tokens",
                            label, usage.prompt_tokens, usage.completion_tokens
                        );
                    }
                    return Ok(reply);
                }
                Err(e) => {
                    warn!("{}: attempt {} failed — {}", label, attempt + 1, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vision_request_serialises_content_parts() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![
                ChatMessage::system("catalog this"),
                ChatMessage::user_parts(vec![
                    ContentPart::text("FILENAME: a.png"),
                    ContentPart::image("data:image/png;base64,AAAA"),
                ]),
            ],
            temperature: None,
            max_tokens: Some(4096),
            response_format: None,
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["messages"][0]["content"], json!("catalog this"));
        assert_eq!(v["messages"][1]["content"][0]["type"], json!("text"));
        assert_eq!(v["messages"][1]["content"][1]["type"], json!("image_url"));
        assert_eq!(
            v["messages"][1]["content"][1]["image_url"]["url"],
            json!("data:image/png;base64,AAAA")
        );
        // Unset options must not appear on the wire.
        assert!(v.get("temperature").is_none());
        assert!(v.get("response_format").is_none());
    }

    #[test]
    fn strict_schema_format_serialises() {
        let format = ResponseFormat::strict_schema("catalog_metadata", json!({"type": "object"}));
        let v = serde_json::to_value(&format).unwrap();
        assert_eq!(v["type"], json!("json_schema"));
        assert_eq!(v["json_schema"]["name"], json!("catalog_metadata"));
        assert_eq!(v["json_schema"]["strict"], json!(true));
        assert_eq!(v["json_schema"]["schema"]["type"], json!("object"));
    }

    #[test]
    fn null_content_decodes_to_empty_string() {
        let raw: ChatResponseRaw = serde_json::from_value(json!({
            "choices": [{"message": {"content": null}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 0, "total_tokens": 10}
        }))
        .unwrap();
        let choice = raw.choices.into_iter().next().unwrap();
        assert_eq!(choice.message.content, None);
        assert_eq!(raw.usage.unwrap().total_tokens, 10);
    }

    #[test]
    fn truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("short", 400), "short");
        let t = truncate_for_log("héllo wörld", 3);
        assert_eq!(t, "hél…");
    }

    #[test]
    fn base_url_trailing_slash_is_normalised() {
        let client = VisionClient::new("k", "http://localhost:8000/v1/", 5).unwrap();
        assert_eq!(client.base_url, "http://localhost:8000/v1");
    }
}
