//! Execution context shared by the stages of a run.
//!
//! [`ExecCtx`] carries the HTTP client, model backend, endpoint, retry policy
//! and the run's [`Cancellation`]. One context is built at startup; each
//! request gets a cheap clone with its own cancellation handle.

use crate::backend::{Backend, BackoffConfig};
use crate::error::{PipelineError, Result};
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::Notify;

/// Cancellation handle for one run.
///
/// `cancel()` is idempotent. Waiters on [`cancelled`](Self::cancelled) wake
/// immediately, which lets the in-flight model call be abandoned.
#[derive(Debug, Default)]
pub struct Cancellation {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Cancels the wrapped handle when dropped.
///
/// Held by a request handler so that a dropped request future (client gone,
/// deadline hit) cancels the run it started.
#[derive(Debug)]
pub struct CancelOnDrop(pub Arc<Cancellation>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Shared execution context for stage calls.
///
/// # Example
///
/// ```
/// use blog_pipeline::{ExecCtx, MockBackend};
/// use std::sync::Arc;
///
/// let ctx = ExecCtx::builder("http://localhost:11434")
///     .backend(Arc::new(MockBackend::fixed("hello")))
///     .build()
///     .unwrap();
/// assert_eq!(ctx.backend.name(), "mock");
/// ```
#[derive(Clone)]
pub struct ExecCtx {
    /// HTTP client (cheap to clone -- uses `Arc` internally).
    pub client: Client,
    /// Base URL of the model provider.
    pub base_url: String,
    /// Model backend.
    pub backend: Arc<dyn Backend>,
    /// Transport retry policy applied to every stage call.
    pub backoff: BackoffConfig,
    /// Cancellation handle for the current run.
    pub cancellation: Arc<Cancellation>,
}

impl ExecCtx {
    pub fn builder(base_url: impl Into<String>) -> ExecCtxBuilder {
        ExecCtxBuilder {
            client: None,
            base_url: base_url.into(),
            backend: None,
            backoff: None,
            timeout: None,
        }
    }

    /// Clone this context with a fresh cancellation handle for a new run.
    pub fn with_cancellation(&self, cancellation: Arc<Cancellation>) -> Self {
        Self {
            cancellation,
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("backoff", &self.backoff)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Builder for [`ExecCtx`].
pub struct ExecCtxBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    backoff: Option<BackoffConfig>,
    timeout: Option<Duration>,
}

impl ExecCtxBuilder {
    /// Set the HTTP client. If not set, one is built with the configured timeout.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the transport retry policy. Default: [`BackoffConfig::interactive()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Overall HTTP client timeout. Default: 180 seconds. Ignored when a
    /// custom client is supplied. Stage deadlines are enforced separately.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ExecCtx> {
        let backend = self
            .backend
            .ok_or_else(|| PipelineError::InvalidConfig("no model backend configured".into()))?;
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(Duration::from_secs(180)))
                .build()
                .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {}", e)))?,
        };
        Ok(ExecCtx {
            client,
            base_url: normalize_base_url(&self.base_url),
            backend,
            backoff: self.backoff.unwrap_or_default(),
            cancellation: Cancellation::new(),
        })
    }
}

/// Strip known provider path suffixes from a base URL so backends can append
/// their own paths without doubling them.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    for suffix in &["/v1/chat/completions", "/v1", "/api/chat", "/api", "/openai"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com");
        assert_eq!(normalize_base_url("http://localhost:11434/api"), "http://localhost:11434");
        assert_eq!(
            normalize_base_url("https://acme.openai.azure.com/openai"),
            "https://acme.openai.azure.com"
        );
        assert_eq!(
            normalize_base_url("https://acme.openai.azure.com/"),
            "https://acme.openai.azure.com"
        );
    }

    #[test]
    fn test_build_requires_backend() {
        let err = ExecCtx::builder("http://x").build().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_with_cancellation_isolates_runs() {
        let ctx = ExecCtx::builder("http://x")
            .backend(Arc::new(MockBackend::fixed("ok")))
            .build()
            .unwrap();
        let a = ctx.with_cancellation(Cancellation::new());
        let b = ctx.with_cancellation(Cancellation::new());
        a.cancellation.cancel();
        assert!(a.check_cancelled().is_err());
        assert!(b.check_cancelled().is_ok());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let cancel = Cancellation::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let cancel = Cancellation::new();
        cancel.cancel();
        cancel.cancel();
        cancel.cancelled().await;
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_cancel_on_drop() {
        let cancel = Cancellation::new();
        {
            let _guard = CancelOnDrop(cancel.clone());
        }
        assert!(cancel.is_cancelled());
    }
}
