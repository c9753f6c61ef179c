//! Parameter extraction: free-form prompt to `{topic, length}`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::ResponseSchema;
use crate::config::{DefaultModel, StageTable};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::llm_call::LlmCall;
use crate::output_parser::ParseMode;
use crate::prompt::{preview, render, section};
use crate::types::{ExtractedParameters, Stage, DEFAULT_LENGTH, MAX_LENGTH, MIN_LENGTH};

/// Longest topic taken verbatim from a prompt when extraction fails.
pub const FALLBACK_TOPIC_CHARS: usize = 80;

const SYSTEM_TEMPLATE: &str = "\
You are given a user prompt that may describe a blog topic and optionally a desired number of paragraphs.
Return ONLY a compact JSON object with keys:
  topic: concise title/topic (string, 3-80 chars)
  length: integer number of paragraphs (default {default} if absent or invalid; clamp between {min} and {max})
Rules:
  - If no explicit length, use {default}.
  - If length > {max} set it to {max}; if < {min} set it to {min}.
  - Do not add extra keys.
  - Output raw JSON (no code fences).";

/// What the model is asked to return. Both fields are read leniently.
#[derive(Debug, Deserialize)]
struct RawParameters {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    length: Value,
}

/// Turns a free-form prompt into [`ExtractedParameters`].
#[derive(Debug, Clone)]
pub struct Extractor {
    call: LlmCall,
}

impl Extractor {
    pub fn new(call: LlmCall) -> Self {
        let (default, min, max) = (
            DEFAULT_LENGTH.to_string(),
            MIN_LENGTH.to_string(),
            MAX_LENGTH.to_string(),
        );
        let system = render(
            SYSTEM_TEMPLATE,
            &[("default", default.as_str()), ("min", min.as_str()), ("max", max.as_str())],
        );
        let call = call
            .with_system(system)
            .map_config(|c| c.with_schema(ResponseSchema::new("blog_parameters", Self::json_schema())));
        Self { call }
    }

    pub fn from_stages<'a>(stages: &StageTable, default_model: impl Into<DefaultModel<'a>>) -> Self {
        Self::new(LlmCall::from_settings(
            Stage::Extraction,
            stages.get(Stage::Extraction),
            default_model,
        ))
    }

    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {"type": "string"},
                "length": {"type": "integer"}
            },
            "required": ["topic", "length"],
            "additionalProperties": false
        })
    }

    /// Extract parameters from `prompt`. Only cancellation is an error; any
    /// other failure yields the fallback topic with the default length.
    pub async fn extract(&self, ctx: &ExecCtx, prompt: &str) -> Result<ExtractedParameters> {
        self.extract_or_fallback(ctx, prompt).await.map(|(params, _)| params)
    }

    /// Like [`extract`](Self::extract), also reporting whether the fallback was used.
    pub(crate) async fn extract_or_fallback(
        &self,
        ctx: &ExecCtx,
        prompt: &str,
    ) -> Result<(ExtractedParameters, bool)> {
        match self.try_extract(ctx, prompt).await {
            Ok(params) => {
                debug!(topic = %params.topic(), length = params.length(), "parameters extracted");
                Ok((params, false))
            }
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(
                    error = %e,
                    prompt = %preview(prompt, 60),
                    "parameter extraction failed; using prompt as topic"
                );
                Ok((ExtractedParameters::new(fallback_topic(prompt), None), true))
            }
        }
    }

    async fn try_extract(&self, ctx: &ExecCtx, prompt: &str) -> Result<ExtractedParameters> {
        let raw: RawParameters = self
            .call
            .invoke_json(ctx, section("User Prompt", prompt), ParseMode::Lenient)
            .await?;

        let topic = raw
            .topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_topic(prompt));

        Ok(ExtractedParameters::new(topic, coerce_length(&raw.length)))
    }
}

/// Read a length the way models actually write it: `4`, `4.0` or `"4"`.
/// Integers beyond `i64` saturate so they still clamp to the maximum.
fn coerce_length(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            // `as` saturates out-of-range floats.
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<u64>().ok().map(|_| i64::MAX))
        }
        _ => None,
    }
}

/// The prompt itself as a topic: whitespace collapsed, at most
/// [`FALLBACK_TOPIC_CHARS`] characters.
pub fn fallback_topic(prompt: &str) -> String {
    let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(FALLBACK_TOPIC_CHARS) {
        Some((idx, _)) => collapsed[..idx].trim_end().to_string(),
        None => collapsed,
    }
}
