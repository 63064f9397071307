//! Model provider boundary.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::types::{ConverseRequest, ConverseResponse, StopReason, Usage};

/// Provider failure classes that callers treat differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Throttling,
    ModelTimeout,
    InternalServer,
    ServiceUnavailable,
    Other,
}

impl ProviderErrorKind {
    /// Timeout, internal error or unavailable service.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ProviderErrorKind::ModelTimeout
                | ProviderErrorKind::InternalServer
                | ProviderErrorKind::ServiceUnavailable
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn throttling(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Throttling, message)
    }
}

/// A single blocking conversation round-trip.
pub trait ModelClient: Send + Sync {
    fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse, ProviderError>;
}

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API over blocking HTTP.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn request_body(request: &ConverseRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": request.model_id,
            "messages": messages,
            "max_tokens": request.params.max_tokens,
            "temperature": request.params.temperature,
        });
        if !request.params.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(request.params.stop_sequences);
        }
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        body
    }
}

/// Map an HTTP status to an error class.
pub fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        429 => ProviderErrorKind::Throttling,
        408 => ProviderErrorKind::ModelTimeout,
        500 => ProviderErrorKind::InternalServer,
        503 | 529 => ProviderErrorKind::ServiceUnavailable,
        _ => ProviderErrorKind::Other,
    }
}

impl ModelClient for AnthropicClient {
    fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        debug!("Anthropic request: model={}, {} messages", request.model_id, request.messages.len());

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&Self::request_body(request))
            .send()
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    ProviderErrorKind::ModelTimeout
                } else {
                    ProviderErrorKind::Other
                };
                ProviderError::new(kind, format!("Request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::new(
                classify_status(status),
                format!("API error {}: {}", status, body),
            ));
        }

        let parsed: MessagesResponse = response.json().map_err(|e| {
            ProviderError::new(ProviderErrorKind::Other, format!("Malformed response: {}", e))
        })?;

        let text = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect::<String>();
        let stop_reason = StopReason::from_wire(parsed.stop_reason.as_deref().unwrap_or(""));

        Ok(ConverseResponse {
            text,
            stop_reason,
            usage: parsed.usage,
        })
    }
}
