use crate::types::Stage;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, reset, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the provider answers with a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// A single model call exceeded its stage deadline.
    #[error("{stage} call timed out after {elapsed:?}")]
    Timeout { stage: Stage, elapsed: Duration },

    /// The model replied, but the reply does not match the shape the stage expects.
    #[error("{stage} reply failed validation: {message}")]
    Validation { stage: Stage, message: String },

    /// The run was cancelled by the caller.
    #[error("Pipeline was cancelled")]
    Cancelled,

    /// The inbound request carries neither a topic nor a prompt.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration detected at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A mandatory stage produced nothing. Carries no provider detail on purpose;
    /// the cause is logged where it happens.
    #[error("Blog generation failed at the {stage} stage")]
    Fatal { stage: Stage },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Shorthand for a validation failure.
    pub fn validation(stage: Stage, message: impl Into<String>) -> Self {
        Self::Validation {
            stage,
            message: message.into(),
        }
    }

    /// Whether this error is a transient provider condition worth another attempt.
    ///
    /// `retryable_statuses` comes from the backoff policy. Transport failures and
    /// timeouts are always transient; validation, auth and cancellation never are.
    pub fn is_transient(&self, retryable_statuses: &[u16]) -> bool {
        match self {
            PipelineError::HttpError { status, .. } => retryable_statuses.contains(status),
            PipelineError::Request(e) => !e.is_builder() && !e.is_decode(),
            PipelineError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Whether the provider rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, PipelineError::HttpError { status: 401 | 403, .. })
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
