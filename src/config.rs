//! Application configuration.
//!
//! Settings come from, in increasing precedence: built-in defaults, an
//! optional TOML file, environment variables (a `.env` file is loaded by the
//! binary), then CLI flags applied by the binary.
//!
//! ```toml
//! [server]
//! port = 8000
//!
//! [model]
//! provider = "azure"
//! endpoint = "https://acme.openai.azure.com"
//! deployment = "blog-gpt"
//!
//! [stages.drafting]
//! temperature = 0.8
//! timeout_secs = 120
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackoffConfig, OllamaBackend, OpenAiBackend};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::Stage;

/// Environment variable overriding the Azure endpoint.
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
/// Environment variable overriding the Azure deployment name.
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_CHAT_DEPLOYMENT_NAME";

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-stage generation parameters.
    #[serde(default)]
    pub stages: StageTable,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for one whole `/generate-blog` request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_request_timeout() -> u64 {
    120
}

/// Which model provider to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Azure,
    OpenAi,
    Ollama,
}

impl Provider {
    fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Provider::Azure => None,
            Provider::OpenAi => Some("https://api.openai.com"),
            Provider::Ollama => Some("http://localhost:11434"),
        }
    }

    fn requires_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }
}

/// An API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Provider base URL. Defaults per provider; required for Azure.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Azure deployment name. Falls back to `model`.
    #[serde(default)]
    pub deployment: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Model used by every stage that does not name its own.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Resolved from `api_key_env` at load time.
    #[serde(skip)]
    pub api_key: Option<ApiKey>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            endpoint: None,
            deployment: None,
            api_version: default_api_version(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
        }
    }
}

fn default_api_version() -> String {
    "2024-10-21".into()
}
fn default_model() -> String {
    "gpt-5-mini".into()
}
fn default_api_key_env() -> String {
    "AZURE_OPENAI_API_KEY".into()
}

/// The model a stage uses when its settings name none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultModel<'a> {
    /// Sent as the request `model`. On Azure this is the deployment.
    pub name: &'a str,
    /// The model behind `name`, for capability checks.
    pub family: &'a str,
}

impl<'a> From<&'a str> for DefaultModel<'a> {
    fn from(model: &'a str) -> Self {
        Self {
            name: model,
            family: model,
        }
    }
}

/// `[retry]` section: transport retry for every stage call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    1.5
}
fn default_max_delay_ms() -> u64 {
    10_000
}

/// Generation parameters for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    /// Overrides `[model].model` for this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// `None` leaves sampling to the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub max_tokens: u32,
    /// Deadline for one attempt of this stage's call.
    pub timeout_secs: u64,
}

impl StageSettings {
    fn new(temperature: f64, max_tokens: u32, timeout_secs: u64) -> Self {
        Self {
            model: None,
            temperature: Some(temperature),
            max_tokens,
            timeout_secs,
        }
    }

    fn merge(mut self, overrides: StageOverrides) -> Self {
        if overrides.model.is_some() {
            self.model = overrides.model;
        }
        if overrides.temperature.is_some() {
            self.temperature = overrides.temperature;
        }
        if let Some(v) = overrides.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = overrides.timeout_secs {
            self.timeout_secs = v;
        }
        self
    }
}

/// A partially specified `[stages.*]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageOverrides {
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageTableFile {
    #[serde(default)]
    extraction: StageOverrides,
    #[serde(default)]
    drafting: StageOverrides,
    #[serde(default)]
    optimization: StageOverrides,
    #[serde(default)]
    revision: StageOverrides,
}

/// `[stages]` section: one [`StageSettings`] per stage. Keys omitted from a
/// stage table keep that stage's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StageTableFile")]
pub struct StageTable {
    pub extraction: StageSettings,
    pub drafting: StageSettings,
    pub optimization: StageSettings,
    pub revision: StageSettings,
}

impl Default for StageTable {
    fn default() -> Self {
        Self {
            // Low temperature: the reply is a two-field record.
            extraction: StageSettings::new(0.1, 256, 30),
            drafting: StageSettings::new(0.9, 4096, 90),
            // The report embeds a full revised article.
            optimization: StageSettings::new(0.4, 8192, 120),
            revision: StageSettings::new(0.9, 4096, 90),
        }
    }
}

impl From<StageTableFile> for StageTable {
    fn from(file: StageTableFile) -> Self {
        let d = StageTable::default();
        Self {
            extraction: d.extraction.merge(file.extraction),
            drafting: d.drafting.merge(file.drafting),
            optimization: d.optimization.merge(file.optimization),
            revision: d.revision.merge(file.revision),
        }
    }
}

impl StageTable {
    pub fn get(&self, stage: Stage) -> &StageSettings {
        match stage {
            Stage::Extraction => &self.extraction,
            Stage::Drafting => &self.drafting,
            Stage::Optimization => &self.optimization,
            Stage::Revision => &self.revision,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (Stage, &StageSettings)> {
        [
            Stage::Extraction,
            Stage::Drafting,
            Stage::Optimization,
            Stage::Revision,
        ]
        .into_iter()
        .map(move |s| (s, self.get(s)))
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Defaults (or `path`, if given) overlaid with the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            PipelineError::InvalidConfig(format!("failed to parse {}: {e}", path.display()))
        })
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.model.provider == Provider::Azure {
            if let Some(endpoint) = get(ENV_ENDPOINT) {
                self.model.endpoint = Some(endpoint);
            }
            if let Some(deployment) = get(ENV_DEPLOYMENT) {
                self.model.deployment = Some(deployment);
            }
        }
        if let Some(key) = get(&self.model.api_key_env) {
            self.model.api_key = Some(ApiKey::new(key));
        }
    }

    /// Provider base URL after defaults.
    pub fn endpoint(&self) -> Option<&str> {
        self.model
            .endpoint
            .as_deref()
            .or_else(|| self.model.provider.default_endpoint())
    }

    /// The model (or Azure deployment) a stage uses when it names none.
    pub fn default_model(&self) -> &str {
        match (self.model.provider, &self.model.deployment) {
            (Provider::Azure, Some(deployment)) => deployment,
            _ => &self.model.model,
        }
    }

    /// [`default_model`](Self::default_model) paired with the model behind it.
    pub fn model_defaults(&self) -> DefaultModel<'_> {
        DefaultModel {
            name: self.default_model(),
            family: &self.model.model,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Reject configurations that cannot serve a request.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.endpoint().is_none() {
            return invalid(format!(
                "no model endpoint configured; set [model].endpoint or {ENV_ENDPOINT}"
            ));
        }
        if self.model.provider.requires_key() && self.model.api_key.is_none() {
            return invalid(format!(
                "API key not found. Set the {} environment variable",
                self.model.api_key_env
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return invalid("server.request_timeout_secs must be positive".into());
        }
        if self.retry.multiplier < 1.0 {
            return invalid("retry.multiplier must be at least 1.0".into());
        }
        for (stage, settings) in self.stages.iter() {
            if settings.timeout_secs == 0 {
                return invalid(format!("stages.{stage}.timeout_secs must be positive"));
            }
            if settings.max_tokens == 0 {
                return invalid(format!("stages.{stage}.max_tokens must be positive"));
            }
            if let Some(t) = settings.temperature {
                if !(0.0..=2.0).contains(&t) {
                    return invalid(format!("stages.{stage}.temperature {t} is outside [0, 2]"));
                }
            }
        }
        Ok(())
    }

    pub fn to_backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_retries: self.retry.max_retries,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            ..BackoffConfig::interactive()
        }
    }

    /// The model backend for the configured provider.
    pub fn backend(&self) -> Arc<dyn Backend> {
        let with_key = |backend: OpenAiBackend| match &self.model.api_key {
            Some(key) => backend.with_api_key(key.expose()),
            None => backend,
        };
        match self.model.provider {
            Provider::Azure => Arc::new(with_key(OpenAiBackend::azure(&self.model.api_version))),
            Provider::OpenAi => Arc::new(with_key(OpenAiBackend::new())),
            Provider::Ollama => Arc::new(OllamaBackend),
        }
    }

    /// Validate, then build the shared execution context.
    pub fn exec_ctx(&self) -> Result<ExecCtx> {
        self.validate()?;
        let endpoint = self
            .endpoint()
            .ok_or_else(|| PipelineError::InvalidConfig("no model endpoint configured".into()))?;
        ExecCtx::builder(endpoint)
            .backend(self.backend())
            .backoff(self.to_backoff())
            .timeout(self.request_timeout())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(toml_str.contains("AZURE_OPENAI_API_KEY"));
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.server.port, 8000);
        assert_eq!(parsed.stages, StageTable::default());
    }

    #[test]
    fn partial_stage_table_keeps_stage_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[stages.extraction]
max_tokens = 128

[stages.drafting]
model = "gpt-4o"
"#,
        )
        .expect("parse");
        assert_eq!(config.stages.extraction.max_tokens, 128);
        assert_eq!(config.stages.extraction.temperature, Some(0.1));
        assert_eq!(config.stages.drafting.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.stages.drafting.temperature, Some(0.9));
        assert_eq!(config.stages.optimization, StageTable::default().optimization);
    }

    #[test]
    fn unknown_stage_key_rejected() {
        let result: std::result::Result<AppConfig, _> =
            toml::from_str("[stages.drafting]\ntemprature = 0.3\n");
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_azure_settings() {
        let mut config = AppConfig::default();
        config.apply_env_from(env(&[
            (ENV_ENDPOINT, "https://acme.openai.azure.com"),
            (ENV_DEPLOYMENT, "blog-gpt"),
            ("AZURE_OPENAI_API_KEY", "secret"),
        ]));
        assert_eq!(config.endpoint(), Some("https://acme.openai.azure.com"));
        assert_eq!(config.default_model(), "blog-gpt");
        assert_eq!(
            config.model_defaults(),
            DefaultModel {
                name: "blog-gpt",
                family: "gpt-5-mini"
            }
        );
        assert_eq!(config.model.api_key.as_ref().map(ApiKey::expose), Some("secret"));
        assert!(config.validate().is_ok());
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn azure_env_ignored_for_other_providers() {
        let mut config = AppConfig::default();
        config.model.provider = Provider::Ollama;
        config.apply_env_from(env(&[(ENV_ENDPOINT, "https://acme.openai.azure.com")]));
        assert_eq!(config.endpoint(), Some("http://localhost:11434"));
        assert!(config.validate().is_ok(), "ollama needs no key");
    }

    #[test]
    fn validation_failures() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.model.provider = Provider::OpenAi;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API key not found"));

        config.model.api_key = Some(ApiKey::new("k"));
        assert!(config.validate().is_ok());
        config.stages.drafting.temperature = Some(2.5);
        assert!(config.validate().unwrap_err().to_string().contains("stages.drafting"));
    }

    #[test]
    fn backoff_from_retry_section() {
        let mut config = AppConfig::default();
        config.retry.max_retries = 4;
        config.retry.initial_delay_ms = 100;
        let backoff = config.to_backoff();
        assert_eq!(backoff.max_retries, 4);
        assert_eq!(backoff.initial_delay, Duration::from_millis(100));
        assert!(backoff.retryable_statuses.contains(&503));
    }

    #[test]
    fn exec_ctx_uses_provider_backend() {
        let mut config = AppConfig::default();
        config.model.provider = Provider::Ollama;
        let ctx = config.exec_ctx().expect("ctx");
        assert_eq!(ctx.backend.name(), "ollama");
        assert_eq!(ctx.base_url, "http://localhost:11434");
    }
}
