//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over model providers, translating between
//! normalized [`LlmRequest`]/[`LlmResponse`] types and provider-specific
//! HTTP APIs. Built-in implementations: [`OpenAiBackend`] (OpenAI and Azure
//! OpenAI), [`OllamaBackend`], and [`MockBackend`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! LlmCall ──► LlmRequest ──► with_backoff() ──► Backend::complete() ──► LlmResponse
//!                                 │                     │
//!                      retry / timeout / cancel   ┌─────┴──────┬──────────┐
//!                                           OpenAiBackend  OllamaBackend  MockBackend
//!                                          /v1/chat/...     /api/chat
//!                                          Azure deployments
//! ```

pub mod backoff;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use backoff::BackoffConfig;
pub use mock::{MockBackend, MockReply};
pub use ollama::OllamaBackend;
pub use openai::{OpenAiBackend, OpenAiFlavor};

use crate::client::LlmConfig;
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::types::Stage;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A provider-agnostic model request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Which stage issued the call (for logs and test doubles).
    pub stage: Stage,

    /// Model identifier, or the deployment name on Azure.
    pub model: String,

    /// System instructions, if any.
    pub system_prompt: Option<String>,

    /// The latest user turn.
    pub prompt: String,

    /// Prior conversation placed between the system prompt and `prompt`.
    /// Empty for single-turn calls.
    pub messages: Vec<ChatMessage>,

    /// Generation parameters.
    pub config: LlmConfig,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A normalized model response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token usage, model, request id).
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over model providers.
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
/// Implementations return [`PipelineError::HttpError`] for non-success
/// statuses so the retry loop can classify them.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one non-streaming completion.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value given in seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Turn a non-success response into [`PipelineError::HttpError`].
pub(crate) async fn error_from_response(resp: reqwest::Response) -> PipelineError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();
    PipelineError::HttpError {
        status,
        body,
        retry_after,
    }
}

/// Execute one stage call with bounded retry, a per-attempt deadline and
/// cancellation.
///
/// Transient failures (see [`PipelineError::is_transient`]) are retried up to
/// `ctx.backoff.max_retries` times. Anything else is returned immediately.
/// Cancellation is checked before every attempt and races both the backoff
/// sleep and the in-flight call.
pub async fn with_backoff(
    ctx: &ExecCtx,
    request: &LlmRequest,
    attempt_timeout: Duration,
) -> Result<LlmResponse> {
    let policy = &ctx.backoff;
    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..=policy.max_retries {
        ctx.check_cancelled()?;

        if attempt > 0 {
            let hint = match &last_error {
                Some(PipelineError::HttpError { retry_after, .. }) => *retry_after,
                _ => None,
            };
            let delay = policy.delay_with_hint(attempt - 1, hint);
            info!(
                stage = %request.stage,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "retrying model call"
            );
            tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let started = Instant::now();
        let call = ctx.backend.complete(&ctx.client, &ctx.base_url, request);
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => return Err(PipelineError::Cancelled),
            r = tokio::time::timeout(attempt_timeout, call) => match r {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Timeout {
                    stage: request.stage,
                    elapsed: attempt_timeout,
                }),
            },
        };

        match outcome {
            Ok(response) => {
                debug!(
                    stage = %request.stage,
                    backend = ctx.backend.name(),
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    usage = ?response.metadata,
                    "model call completed"
                );
                return Ok(response);
            }
            Err(e) if attempt < policy.max_retries && e.is_transient(&policy.retryable_statuses) => {
                warn!(stage = %request.stage, attempt, error = %e, "transient model error");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| PipelineError::Other("backoff loop exited unexpectedly".into())))
}
