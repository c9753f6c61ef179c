use serde_json::Value;

/// Structured-output contract attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema name (providers require `^[a-zA-Z0-9_-]+$`).
    pub name: String,
    /// JSON schema the reply must satisfy.
    pub schema: Value,
    /// Ask the provider to enforce the schema exactly.
    pub strict: bool,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }
}

/// Generation parameters for one model call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// Sampling temperature. `None` leaves it to the provider (required for
    /// models that reject the parameter).
    pub temperature: Option<f64>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Optional output schema; `None` means free text.
    pub response_schema: Option<ResponseSchema>,

    /// Model id used for capability checks when the request `model` names a
    /// deployment rather than a model. `None` means the request model.
    pub model_family: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: 2048,
            response_schema: None,
            model_family: None,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn without_temperature(mut self) -> Self {
        self.temperature = None;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_model_family(mut self, family: impl Into<String>) -> Self {
        self.model_family = Some(family.into());
        self
    }

    /// Whether the reply is expected to be structured JSON.
    pub fn is_structured(&self) -> bool {
        self.response_schema.is_some()
    }
}
