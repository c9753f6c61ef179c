//! HTTP surface: `POST /generate-blog`, `POST /echo`, `GET /healthz`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::exec_ctx::{CancelOnDrop, Cancellation, ExecCtx};
use crate::orchestrator::Orchestrator;
use crate::types::GenerationRequest;

/// Shown to the caller for every failure that is not the caller's fault.
pub const GENERIC_FAILURE: &str = "Blog generation failed. Please try again later.";

const TIMEOUT_FAILURE: &str = "Blog generation took too long. Please try again later.";

/// Shared by every handler. Cloned per request.
#[derive(Debug, Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    ctx: ExecCtx,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, ctx: ExecCtx, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            ctx,
            request_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate-blog", post(generate_blog))
        .route("/echo", post(echo))
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Build everything from `config` and serve until Ctrl-C.
pub async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let ctx = config.exec_ctx().context("building model client")?;
    let state = AppState::new(
        Arc::new(Orchestrator::from_config(config)),
        ctx,
        config.request_timeout(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(
        %addr,
        provider = ?config.model.provider,
        model = %config.default_model(),
        "blog pipeline listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

async fn generate_blog(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match decode_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let cancellation = Cancellation::new();
    let _cancel_on_drop = CancelOnDrop(cancellation.clone());
    let ctx = state.ctx.with_cancellation(cancellation);

    match tokio::time::timeout(state.request_timeout, state.orchestrator.run(&ctx, &request)).await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(_) => {
            warn!(timeout = ?state.request_timeout, "request deadline exceeded; run cancelled");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": TIMEOUT_FAILURE })),
            )
                .into_response()
        }
    }
}

async fn echo(body: Bytes) -> Json<Value> {
    let text = String::from_utf8_lossy(&body);
    let received = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text.into_owned()));
    Json(json!({ "received": received }))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Read a request body the way chat relays send it: a JSON object, a bare
/// JSON string, or plain text. The last two become a prompt.
pub fn decode_request(body: &[u8]) -> Result<GenerationRequest, PipelineError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| PipelineError::InvalidRequest("request body is not UTF-8".into()))?
        .trim();
    if text.is_empty() {
        return Err(PipelineError::InvalidRequest("request body is empty".into()));
    }

    let request = match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => serde_json::from_value::<GenerationRequest>(value)
            .map_err(|e| PipelineError::InvalidRequest(format!("malformed request: {}", e)))?,
        Ok(Value::String(prompt)) => GenerationRequest::from_prompt(prompt),
        Ok(_) => {
            return Err(PipelineError::InvalidRequest(
                "expected an object with `topic` or `prompt`".into(),
            ))
        }
        Err(_) => GenerationRequest::from_prompt(text),
    };
    request.form()?;
    Ok(request)
}

fn error_response(error: &PipelineError) -> Response {
    match error {
        PipelineError::InvalidRequest(message) => {
            warn!(%message, "rejected request");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
        other => {
            warn!(error = %other, "blog generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": GENERIC_FAILURE })),
            )
                .into_response()
        }
    }
}
