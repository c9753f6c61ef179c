//! Mock backend for testing without a live model.
//!
//! [`MockBackend`] replays scripted replies in order, or routes each request
//! through a closure, and records every request it receives.
//!
//! # Example
//!
//! ```
//! use blog_pipeline::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::scripted(vec![MockReply::Status(503), MockReply::text("# Hi")]);
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;

/// One canned reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Succeed with this text.
    Text(String),
    /// Fail with this HTTP status.
    Status(u16),
    /// Succeed with this text after a delay.
    Delayed(Duration, String),
    /// Never answer (exercises timeouts and cancellation).
    Hang,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }
}

type RouteFn = Arc<dyn Fn(&LlmRequest) -> MockReply + Send + Sync>;

enum Script {
    Sequence(Vec<MockReply>),
    Routed(RouteFn),
}

/// A test backend with scripted or routed replies.
///
/// A sequence cycles back to the beginning once exhausted.
pub struct MockBackend {
    script: Script,
    index: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockBackend {
    /// Successful text replies, in order.
    pub fn new(responses: Vec<String>) -> Self {
        Self::scripted(responses.into_iter().map(MockReply::Text).collect())
    }

    /// Always the same successful reply.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::scripted(vec![MockReply::text(response)])
    }

    /// Arbitrary replies, in order. An empty script answers 500.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            script: Script::Sequence(replies),
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Decide each reply from the request itself. Safe under concurrent runs.
    pub fn routed(route: impl Fn(&LlmRequest) -> MockReply + Send + Sync + 'static) -> Self {
        Self {
            script: Script::Routed(Arc::new(route)),
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn next_reply(&self, request: &LlmRequest) -> MockReply {
        match &self.script {
            Script::Sequence(replies) if replies.is_empty() => MockReply::Status(500),
            Script::Sequence(replies) => {
                let idx = self.index.fetch_add(1, Ordering::Relaxed) % replies.len();
                replies[idx].clone()
            }
            Script::Routed(route) => route(request),
        }
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.script {
            Script::Sequence(ref r) => format!("sequence({})", r.len()),
            Script::Routed(_) => "routed".to_string(),
        };
        f.debug_struct("MockBackend")
            .field("mode", &mode)
            .field("calls", &self.call_count())
            .finish()
    }
}

fn ok(text: String) -> Result<LlmResponse> {
    Ok(LlmResponse {
        text,
        status: 200,
        metadata: None,
    })
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        match self.next_reply(request) {
            MockReply::Text(text) => ok(text),
            MockReply::Status(status) => Err(PipelineError::HttpError {
                status,
                body: format!("mock status {}", status),
                retry_after: None,
            }),
            MockReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                ok(text)
            }
            MockReply::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
