//! Backend for OpenAI chat completions, direct or through Azure OpenAI.
//!
//! Endpoints:
//! - OpenAI: `{base}/v1/chat/completions`, `Authorization: Bearer {key}`
//! - Azure: `{base}/openai/deployments/{deployment}/chat/completions?api-version={v}`,
//!   `api-key: {key}`. The request's `model` field names the deployment.
//!
//! Structured output is requested with `response_format: json_schema`.

use super::{error_from_response, Backend, LlmRequest, LlmResponse, Role};
use crate::error::Result;
use crate::types::Stage;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Which flavour of the chat completions API to speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    Azure { api_version: String },
}

/// Backend for OpenAI and Azure OpenAI.
///
/// # Example
///
/// ```
/// use blog_pipeline::backend::{Backend, OpenAiBackend};
///
/// let openai = OpenAiBackend::new().with_api_key("sk-...");
/// let azure = OpenAiBackend::azure("2024-10-21").with_api_key("...");
/// assert_eq!(openai.name(), "openai");
/// assert_eq!(azure.name(), "azure");
/// ```
#[derive(Clone)]
pub struct OpenAiBackend {
    flavor: OpenAiFlavor,
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("flavor", &self.flavor)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| match k.get(..6) {
                    Some(prefix) if k.len() > 6 => format!("{}***", prefix),
                    _ => "***".to_string(),
                }),
            )
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new() -> Self {
        Self {
            flavor: OpenAiFlavor::OpenAi,
            api_key: None,
        }
    }

    pub fn azure(api_version: impl Into<String>) -> Self {
        Self {
            flavor: OpenAiFlavor::Azure {
                api_version: api_version.into(),
            },
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Reasoning-model families reject `temperature` and `max_tokens`.
    fn is_reasoning_model(model: &str) -> bool {
        let m = model.to_ascii_lowercase();
        ["gpt-5", "o1", "o3", "o4"].iter().any(|p| m.starts_with(p))
    }

    fn endpoint(&self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match &self.flavor {
            OpenAiFlavor::OpenAi => format!("{}/v1/chat/completions", base),
            OpenAiFlavor::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, model, api_version
            ),
        }
    }

    /// System prompt, then prior turns, then the current prompt.
    fn build_messages(request: &LlmRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(request.messages.len() + 2);

        if let Some(sys) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({"role": Role::System.as_str(), "content": sys}));
        }
        for msg in &request.messages {
            messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
        }
        messages.push(json!({"role": Role::User.as_str(), "content": request.prompt}));

        messages
    }

    fn build_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "messages": Self::build_messages(request),
        });

        // Azure takes the deployment from the URL.
        if !request.model.is_empty() {
            body["model"] = json!(request.model);
        }

        let family = request.config.model_family.as_deref().unwrap_or(&request.model);
        if Self::is_reasoning_model(family) {
            body["max_completion_tokens"] = json!(request.config.max_tokens);
        } else {
            body["max_tokens"] = json!(request.config.max_tokens);
            if let Some(t) = request.config.temperature {
                body["temperature"] = json!(t);
            }
        }

        if let Some(ref schema) = request.config.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": schema.strict,
                }
            });
        }

        body
    }

    fn build_http_request(
        &self,
        client: &Client,
        url: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let req = client.post(url).json(body);
        match (&self.flavor, &self.api_key) {
            (OpenAiFlavor::OpenAi, Some(key)) => req.bearer_auth(key),
            (OpenAiFlavor::Azure { .. }, Some(key)) => req.header("api-key", key.as_str()),
            (_, None) => req,
        }
    }

    /// Pull the reply text out of a completion, treating a refusal as invalid
    /// output for the stage.
    fn extract_text(stage: Stage, json_resp: &Value) -> Result<String> {
        let message = json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"));

        if let Some(refusal) = message
            .and_then(|m| m.get("refusal"))
            .and_then(|r| r.as_str())
            .filter(|r| !r.is_empty())
        {
            return Err(PipelineError::validation(
                stage,
                format!("model refused: {}", refusal),
            ));
        }

        Ok(message
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string())
    }

    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let meta: serde_json::Map<String, Value> = ["usage", "model", "id"]
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

impl Default for OpenAiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = self.endpoint(base_url, &request.model);
        let body = Self::build_body(request);

        let resp = self.build_http_request(client, &url, &body).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let json_resp: Value = resp.json().await?;
        Ok(LlmResponse {
            text: Self::extract_text(request.stage, &json_resp)?,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        match self.flavor {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::Azure { .. } => "azure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatMessage;
    use crate::client::{LlmConfig, ResponseSchema};

    fn test_request() -> LlmRequest {
        LlmRequest {
            stage: Stage::Drafting,
            model: "gpt-4o".into(),
            system_prompt: None,
            prompt: "Write about tea.".into(),
            messages: Vec::new(),
            config: LlmConfig::default(),
        }
    }

    #[test]
    fn test_chat_payload() {
        let mut request = test_request();
        request.system_prompt = Some("You are a writer.".into());

        let body = OpenAiBackend::build_body(&request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 2048);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Write about tea.");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_schema_becomes_response_format() {
        let mut request = test_request();
        request.config = request
            .config
            .with_schema(ResponseSchema::new("seo_report", json!({"type": "object"})));

        let body = OpenAiBackend::build_body(&request);
        let rf = &body["response_format"];
        assert_eq!(rf["type"], "json_schema");
        assert_eq!(rf["json_schema"]["name"], "seo_report");
        assert_eq!(rf["json_schema"]["strict"], true);
    }

    #[test]
    fn test_reasoning_model_omits_temperature() {
        let mut request = test_request();
        request.model = "gpt-5-mini".into();

        let body = OpenAiBackend::build_body(&request);
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["max_completion_tokens"], 2048);
    }

    #[test]
    fn test_azure_deployment_uses_model_family() {
        use crate::config::{AppConfig, Provider, ENV_DEPLOYMENT};
        use crate::llm_call::LlmCall;

        let mut config = AppConfig::default();
        config.model.provider = Provider::Azure;
        config.model.model = "gpt-5-mini".into();
        config.apply_env_from(|key| (key == ENV_DEPLOYMENT).then(|| "blog-writer".to_string()));

        let call = LlmCall::from_settings(
            Stage::Drafting,
            config.stages.get(Stage::Drafting),
            config.model_defaults(),
        );
        let request = call.build_request("Write about tea.", Vec::new());
        assert_eq!(request.model, "blog-writer");

        let body = OpenAiBackend::build_body(&request);
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["max_completion_tokens"], 4096);

        let mut chat = test_request();
        chat.model = "blog-writer".into();
        chat.config = chat.config.with_model_family("gpt-4o");
        let body = OpenAiBackend::build_body(&chat);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["temperature"], 0.7);
    }

    #[test]
    fn test_unset_temperature_is_omitted() {
        let mut request = test_request();
        request.config = request.config.without_temperature();
        let body = OpenAiBackend::build_body(&request);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_history_precedes_prompt() {
        let mut request = test_request();
        request.system_prompt = Some("Be concise.".into());
        request.messages = vec![
            ChatMessage::user("Write about tea."),
            ChatMessage::assistant("# Tea\n\nTea is nice."),
        ];
        request.prompt = "Apply this report.".into();

        let body = OpenAiBackend::build_body(&request);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["role"], "user");
        assert_eq!(messages[3]["content"], "Apply this report.");
    }

    #[test]
    fn test_endpoints() {
        let openai = OpenAiBackend::new();
        assert_eq!(
            openai.endpoint("https://api.openai.com/", "gpt-4o"),
            "https://api.openai.com/v1/chat/completions"
        );
        let azure = OpenAiBackend::azure("2024-10-21");
        assert_eq!(
            azure.endpoint("https://acme.openai.azure.com", "blog-gpt"),
            "https://acme.openai.azure.com/openai/deployments/blog-gpt/chat/completions?api-version=2024-10-21"
        );
    }

    #[test]
    fn test_auth_headers() {
        let client = Client::new();
        let body = json!({});

        let req = OpenAiBackend::new()
            .with_api_key("sk-test123")
            .build_http_request(&client, "https://api.openai.com/v1/chat/completions", &body)
            .build()
            .expect("build request");
        assert_eq!(req.headers().get("Authorization").unwrap(), "Bearer sk-test123");

        let req = OpenAiBackend::azure("2024-10-21")
            .with_api_key("azure-key")
            .build_http_request(&client, "https://acme.openai.azure.com/x", &body)
            .build()
            .expect("build request");
        assert_eq!(req.headers().get("api-key").unwrap(), "azure-key");
        assert!(req.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_extract_text_and_refusal() {
        let ok = json!({"choices": [{"message": {"content": "# Title"}}]});
        assert_eq!(OpenAiBackend::extract_text(Stage::Drafting, &ok).unwrap(), "# Title");

        let refused = json!({"choices": [{"message": {"content": null, "refusal": "no"}}]});
        let err = OpenAiBackend::extract_text(Stage::Optimization, &refused).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation { stage: Stage::Optimization, .. }
        ));
    }

    #[test]
    fn test_extract_metadata() {
        let resp = json!({"id": "c1", "model": "gpt-4o", "usage": {"total_tokens": 9}});
        let meta = OpenAiBackend::extract_metadata(&resp).unwrap();
        assert_eq!(meta["usage"]["total_tokens"], 9);
        assert!(OpenAiBackend::extract_metadata(&json!({})).is_none());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let backend = OpenAiBackend::new().with_api_key("sk-1234567890abcdef");
        let debug_output = format!("{:?}", backend);
        assert!(!debug_output.contains("1234567890abcdef"));
        assert!(debug_output.contains("sk-123***"));
    }
}
