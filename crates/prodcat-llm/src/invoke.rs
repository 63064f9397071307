//! Model invocation shared by normalization, categorization and extraction.
//!
//! Throttling is the only condition retried here. Timeouts and server
//! faults surface as `Error::Transient` for the caller to decide on.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::client::{ModelClient, ProviderError, ProviderErrorKind};
use crate::types::{ConverseRequest, ConverseResponse, Message, StopReason};
use prodcat_core::{Error, Result};

/// Randomized exponential backoff for throttled calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            multiplier: 0.0,
        }
    }

    /// Wait after failed attempt `attempt` (1-based): uniform between
    /// `min_wait` and `multiplier * 2^(attempt-1)` clamped to `[min_wait, max_wait]`.
    pub fn wait_for(&self, attempt: u32) -> Duration {
        let min = self.min_wait.as_secs_f64();
        let max = self.max_wait.as_secs_f64().max(min);
        let exp = self.multiplier * 2f64.powi(attempt.saturating_sub(1) as i32);
        let high = exp.clamp(min, max);
        if high <= min {
            return self.min_wait;
        }
        Duration::from_secs_f64(rand::rng().random_range(min..=high))
    }
}

/// Calls the model client, retrying throttled requests.
pub struct ModelInvoker {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

impl ModelInvoker {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self::with_retry_policy(client, RetryPolicy::default())
    }

    pub fn with_retry_policy(client: Arc<dyn ModelClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn invoke(&self, request: &ConverseRequest) -> Result<ConverseResponse> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.client.converse(request) {
                Ok(response) => {
                    info!(
                        "Model {} usage: input_tokens={}, output_tokens={}",
                        request.model_id, response.usage.input_tokens, response.usage.output_tokens
                    );
                    return Ok(response);
                }
                Err(e) if e.kind == ProviderErrorKind::Throttling && attempt < max_attempts => {
                    let wait = self.retry.wait_for(attempt);
                    warn!(
                        "Throttled by provider (attempt {}/{}), retrying in {:.1}s",
                        attempt,
                        max_attempts,
                        wait.as_secs_f64()
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(provider_error(e)),
            }
        }
    }
}

fn provider_error(e: ProviderError) -> Error {
    error!("Model invocation failed: {}", e);
    match e.kind {
        ProviderErrorKind::Throttling => Error::RateLimited(e.message),
        kind if kind.is_transient() => Error::Transient(e.message),
        _ => Error::Provider(e.message),
    }
}

/// Fixed leading text seeded into the assistant turn and the closing marker
/// generation stops at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub open: String,
    pub close: String,
}

impl ResponseFrame {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    /// `messages` followed by the assistant prefill.
    pub fn seed(&self, messages: &[Message]) -> Vec<Message> {
        let mut seeded = messages.to_vec();
        seeded.push(Message::assistant(self.open.clone()));
        seeded
    }

    /// Reassemble the complete framed response. Accepted only when
    /// generation hit the stop sequence, or ended naturally with the
    /// closing marker already present.
    pub fn build_full_response(&self, response: &ConverseResponse) -> Result<String> {
        match response.stop_reason {
            StopReason::StopSequence => Ok(format!("{}{}{}", self.open, response.text, self.close)),
            StopReason::EndTurn if response.text.ends_with(&self.close) => {
                Ok(format!("{}{}", self.open, response.text))
            }
            ref other => {
                error!("Stop reason: {}", other);
                Err(Error::ModelResponse(format!("Invalid stop reason: {}", other)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedModelClient;

    fn request() -> ConverseRequest {
        ConverseRequest::new("test-model", vec![Message::user("hello")])
    }

    #[test]
    fn test_wait_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_for(1), Duration::from_secs(30));
        for attempt in 1..=8 {
            let w = policy.wait_for(attempt);
            assert!(w >= Duration::from_secs(30) && w <= Duration::from_secs(60), "{:?}", w);
        }
    }

    #[test]
    fn test_throttling_retried_then_succeeds() {
        let client = Arc::new(ScriptedModelClient::new());
        client.push_error(ProviderError::throttling("ThrottlingException"));
        client.push_text("ok", StopReason::EndTurn);

        let invoker = ModelInvoker::with_retry_policy(client.clone(), RetryPolicy::immediate(3));
        let response = invoker.invoke(&request()).unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(client.invocations(), 2);
    }

    #[test]
    fn test_throttling_exhausts_attempts() {
        let client = Arc::new(ScriptedModelClient::new());
        for _ in 0..5 {
            client.push_error(ProviderError::throttling("ThrottlingException"));
        }
        let invoker = ModelInvoker::with_retry_policy(client.clone(), RetryPolicy::immediate(3));
        let err = invoker.invoke(&request()).unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
        assert_eq!(client.invocations(), 3);
    }

    #[test]
    fn test_transient_not_retried() {
        let client = Arc::new(ScriptedModelClient::new());
        client.push_error(ProviderError::new(ProviderErrorKind::ModelTimeout, "timeout"));
        let invoker = ModelInvoker::with_retry_policy(client.clone(), RetryPolicy::immediate(3));
        let err = invoker.invoke(&request()).unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
        assert!(err.is_retryable());
        assert_eq!(client.invocations(), 1);
    }

    #[test]
    fn test_other_errors_propagate() {
        let client = Arc::new(ScriptedModelClient::new());
        client.push_error(ProviderError::new(ProviderErrorKind::Other, "ValidationException"));
        let invoker = ModelInvoker::with_retry_policy(client.clone(), RetryPolicy::immediate(3));
        assert!(matches!(invoker.invoke(&request()), Err(Error::Provider(_))));
        assert_eq!(client.invocations(), 1);
    }

    #[test]
    fn test_frame_acceptance() {
        let frame = ResponseFrame::new("<response>", "</response>");

        let stopped = ConverseResponse::new("<a>1</a>", StopReason::StopSequence);
        assert_eq!(
            frame.build_full_response(&stopped).unwrap(),
            "<response><a>1</a></response>"
        );

        let ended = ConverseResponse::new("<a>1</a></response>", StopReason::EndTurn);
        assert_eq!(
            frame.build_full_response(&ended).unwrap(),
            "<response><a>1</a></response>"
        );

        let open_ended = ConverseResponse::new("<a>1</a>", StopReason::EndTurn);
        assert!(matches!(
            frame.build_full_response(&open_ended),
            Err(Error::ModelResponse(_))
        ));

        let truncated = ConverseResponse::new("<a>1", StopReason::MaxTokens);
        let err = frame.build_full_response(&truncated).unwrap_err();
        assert_eq!(err.to_string(), "Invalid stop reason: max_tokens");
    }

    #[test]
    fn test_seed_appends_prefill() {
        let frame = ResponseFrame::new("{\"normalized_title\": \"", "\"}");
        let seeded = frame.seed(&[Message::user("normalize")]);
        assert_eq!(seeded.len(), 2);
        assert_eq!(seeded[1], Message::assistant("{\"normalized_title\": \""));
    }
}
