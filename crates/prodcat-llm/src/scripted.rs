//! Replayable model client.
//!
//! Responses and errors are queued up front and handed out in order.
//! Every request is recorded so callers can inspect prompts and count calls.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::client::{ModelClient, ProviderError, ProviderErrorKind};
use crate::types::{ConverseRequest, ConverseResponse, StopReason};

#[derive(Default)]
pub struct ScriptedModelClient {
    queue: Mutex<VecDeque<Result<ConverseResponse, ProviderError>>>,
    requests: Mutex<Vec<ConverseRequest>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: ConverseResponse) -> &Self {
        self.queue.lock().push_back(Ok(response));
        self
    }

    pub fn push_text(&self, text: impl Into<String>, stop_reason: StopReason) -> &Self {
        self.push_response(ConverseResponse::new(text, stop_reason))
    }

    pub fn push_error(&self, error: ProviderError) -> &Self {
        self.queue.lock().push_back(Err(error));
        self
    }

    pub fn invocations(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ConverseRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<ConverseRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

impl ModelClient for ScriptedModelClient {
    fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse, ProviderError> {
        self.requests.lock().push(request.clone());
        self.queue.lock().pop_front().unwrap_or_else(|| {
            Err(ProviderError::new(
                ProviderErrorKind::Other,
                "No scripted response left",
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_replays_in_order_and_records() {
        let client = ScriptedModelClient::new();
        client
            .push_text("first", StopReason::EndTurn)
            .push_text("second", StopReason::StopSequence);

        let req = ConverseRequest::new("m", vec![Message::user("q")]);
        assert_eq!(client.converse(&req).unwrap().text, "first");
        assert_eq!(client.converse(&req).unwrap().text, "second");
        assert!(client.converse(&req).is_err());
        assert_eq!(client.invocations(), 3);
        assert_eq!(client.remaining(), 0);
        assert_eq!(client.last_request().unwrap().messages[0].content, "q");
    }
}
