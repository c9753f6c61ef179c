//! One configured model call per stage.
//!
//! [`LlmCall`] binds a stage to its model, system prompt, generation
//! parameters and deadline. It builds the [`LlmRequest`], dispatches it
//! through [`with_backoff`], and turns unusable replies into
//! [`PipelineError::Validation`] for that stage.

use crate::{
    backend::{with_backoff, ChatMessage, LlmRequest},
    client::LlmConfig,
    config::{DefaultModel, StageSettings},
    error::{PipelineError, Result},
    exec_ctx::ExecCtx,
    output_parser::{self, ParseMode},
    prompt::preview,
    types::Stage,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// A model call bound to one stage.
///
/// # Example
///
/// ```
/// use blog_pipeline::{LlmCall, Stage};
/// use std::time::Duration;
///
/// let call = LlmCall::new(Stage::Extraction, "gpt-5-nano")
///     .with_system("Extract the topic.")
///     .map_config(|c| c.with_temperature(0.1).with_max_tokens(256))
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(call.stage(), Stage::Extraction);
/// assert_eq!(call.config().max_tokens, 256);
/// ```
#[derive(Debug, Clone)]
pub struct LlmCall {
    stage: Stage,
    model: String,
    system_prompt: Option<String>,
    config: LlmConfig,
    timeout: Duration,
}

impl LlmCall {
    pub fn new(stage: Stage, model: impl Into<String>) -> Self {
        Self {
            stage,
            model: model.into(),
            system_prompt: None,
            config: LlmConfig::default(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from a stage's configured settings; `default_model` applies when
    /// the stage does not name its own.
    pub fn from_settings<'a>(
        stage: Stage,
        settings: &StageSettings,
        default_model: impl Into<DefaultModel<'a>>,
    ) -> Self {
        let default_model = default_model.into();
        let (model, family) = match settings.model.as_deref() {
            Some(own) => (own, own),
            None => (default_model.name, default_model.family),
        };
        let mut config = LlmConfig::default().with_max_tokens(settings.max_tokens);
        config.temperature = settings.temperature;
        if family != model {
            config = config.with_model_family(family);
        }
        Self {
            stage,
            model: model.to_string(),
            system_prompt: None,
            config,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Replace the generation parameters while keeping the rest.
    pub fn map_config(mut self, f: impl FnOnce(LlmConfig) -> LlmConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Assemble the normalized request for `prompt` after `history`.
    pub fn build_request(&self, prompt: impl Into<String>, history: Vec<ChatMessage>) -> LlmRequest {
        LlmRequest {
            stage: self.stage,
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            prompt: prompt.into(),
            messages: history,
            config: self.config.clone(),
        }
    }

    /// Run the call and return the raw reply text.
    pub async fn invoke_text(
        &self,
        ctx: &ExecCtx,
        prompt: impl Into<String>,
        history: Vec<ChatMessage>,
    ) -> Result<String> {
        let request = self.build_request(prompt, history);
        debug!(
            stage = %self.stage,
            model = %self.model,
            turns = request.messages.len() + 1,
            prompt = %preview(&request.prompt, 60),
            "calling model"
        );
        let response = with_backoff(ctx, &request, self.timeout).await?;
        Ok(response.text)
    }

    /// Run the call and deserialize the reply as JSON.
    pub async fn invoke_json<T: DeserializeOwned>(
        &self,
        ctx: &ExecCtx,
        prompt: impl Into<String>,
        mode: ParseMode,
    ) -> Result<T> {
        let text = self.invoke_text(ctx, prompt, Vec::new()).await?;
        output_parser::parse_json(&text, mode)
            .map_err(|e| PipelineError::validation(self.stage, e.to_string()))
    }

    /// Run the call and return the cleaned markdown body of the reply.
    pub async fn invoke_markdown(
        &self,
        ctx: &ExecCtx,
        prompt: impl Into<String>,
        history: Vec<ChatMessage>,
    ) -> Result<String> {
        let text = self.invoke_text(ctx, prompt, history).await?;
        output_parser::clean_markdown(&text)
            .map_err(|e| PipelineError::validation(self.stage, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply, Role};
    use serde::Deserialize;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Deserialize)]
    struct Topic {
        topic: String,
    }

    fn ctx(mock: Arc<MockBackend>) -> ExecCtx {
        ExecCtx::builder("http://unused").backend(mock).build().unwrap()
    }

    #[test]
    fn test_from_settings() {
        let settings = StageSettings {
            model: None,
            temperature: Some(0.2),
            max_tokens: 300,
            timeout_secs: 15,
        };
        let call = LlmCall::from_settings(Stage::Extraction, &settings, "gpt-5-nano");
        assert_eq!(call.model(), "gpt-5-nano");
        assert_eq!(call.config().temperature, Some(0.2));
        assert_eq!(call.config().max_tokens, 300);
        assert_eq!(call.timeout(), Duration::from_secs(15));

        let own = StageSettings {
            model: Some("gpt-4o".into()),
            ..settings
        };
        assert_eq!(LlmCall::from_settings(Stage::Drafting, &own, "x").model(), "gpt-4o");
    }

    #[test]
    fn test_from_settings_keeps_family_of_deployment() {
        let settings = StageSettings {
            model: None,
            temperature: Some(0.9),
            max_tokens: 4096,
            timeout_secs: 90,
        };
        let deployment = DefaultModel {
            name: "blog-writer",
            family: "gpt-5-mini",
        };
        let call = LlmCall::from_settings(Stage::Drafting, &settings, deployment);
        assert_eq!(call.model(), "blog-writer");
        assert_eq!(call.config().model_family.as_deref(), Some("gpt-5-mini"));

        let own = StageSettings {
            model: Some("gpt-4o".into()),
            ..settings
        };
        let call = LlmCall::from_settings(Stage::Drafting, &own, deployment);
        assert_eq!(call.model(), "gpt-4o");
        assert!(call.config().model_family.is_none());
    }

    #[test]
    fn test_build_request_carries_history() {
        let call = LlmCall::new(Stage::Revision, "m").with_system("sys");
        let req = call.build_request("revise", vec![ChatMessage::user("a"), ChatMessage::assistant("b")]);
        assert_eq!(req.stage, Stage::Revision);
        assert_eq!(req.system_prompt.as_deref(), Some("sys"));
        assert_eq!(req.messages[1].role, Role::Assistant);
        assert_eq!(req.prompt, "revise");
    }

    #[tokio::test]
    async fn test_invoke_json_parses_reply() {
        let mock = Arc::new(MockBackend::fixed("```json\n{\"topic\": \"tea\"}\n```"));
        let call = LlmCall::new(Stage::Extraction, "m");
        let parsed: Topic = assert_ok!(call.invoke_json(&ctx(mock), "p", ParseMode::Strict).await);
        assert_eq!(parsed.topic, "tea");
    }

    #[tokio::test]
    async fn test_invoke_json_unparseable_is_validation_error() {
        let mock = Arc::new(MockBackend::fixed("I'd rather not."));
        let call = LlmCall::new(Stage::Optimization, "m");
        let err = assert_err!(call.invoke_json::<Topic>(&ctx(mock.clone()), "p", ParseMode::Strict).await);
        assert!(matches!(err, PipelineError::Validation { stage: Stage::Optimization, .. }));
        assert_eq!(mock.call_count(), 1, "validation failures are not retried");
    }

    #[tokio::test]
    async fn test_invoke_markdown_rejects_empty() {
        let mock = Arc::new(MockBackend::scripted(vec![MockReply::text("<think>...</think>")]));
        let call = LlmCall::new(Stage::Drafting, "m");
        let err = assert_err!(call.invoke_markdown(&ctx(mock), "p", Vec::new()).await);
        assert!(matches!(err, PipelineError::Validation { stage: Stage::Drafting, .. }));
    }
}
