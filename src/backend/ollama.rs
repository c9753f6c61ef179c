//! Backend for Ollama's native chat API.
//!
//! [`OllamaBackend`] translates normalized [`LlmRequest`]s into `/api/chat`
//! calls. A response schema is passed through `format`, which Ollama uses to
//! constrain generation.

use super::{error_from_response, Backend, LlmRequest, LlmResponse, Role};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for a local or self-hosted Ollama server.
#[derive(Debug, Clone, Default)]
pub struct OllamaBackend;

impl OllamaBackend {
    fn build_options(request: &LlmRequest) -> Value {
        let mut opts = json!({ "num_predict": request.config.max_tokens });
        if let Some(t) = request.config.temperature {
            opts["temperature"] = json!(t);
        }
        opts
    }

    fn build_chat_body(request: &LlmRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 2);

        if let Some(sys) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({"role": Role::System.as_str(), "content": sys}));
        }
        for msg in &request.messages {
            messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
        }
        messages.push(json!({"role": Role::User.as_str(), "content": request.prompt}));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
            "options": Self::build_options(request),
        });
        if let Some(ref schema) = request.config.response_schema {
            body["format"] = schema.schema.clone();
        }
        body
    }

    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let meta: serde_json::Map<String, Value> = [
            "total_duration",
            "eval_count",
            "eval_duration",
            "prompt_eval_count",
            "model",
        ]
        .iter()
        .filter_map(|k| json_resp.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
        let body = Self::build_chat_body(request);

        let resp = client.post(&url).json(&body).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let json_resp: Value = resp.json().await?;
        let text = json_resp
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        Ok(LlmResponse {
            text,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
