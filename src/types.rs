//! Request-scoped value types that flow between stages.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Upper bound of the article length hint (sections/paragraphs).
pub const MAX_LENGTH: u32 = 10;

/// Lower bound of the article length hint.
pub const MIN_LENGTH: u32 = 1;

/// Length used when none can be inferred.
pub const DEFAULT_LENGTH: u32 = 5;

/// Clamp a raw length into `[MIN_LENGTH, MAX_LENGTH]`, defaulting when absent.
pub fn clamp_length(raw: Option<i64>) -> u32 {
    match raw {
        Some(n) => n.clamp(MIN_LENGTH as i64, MAX_LENGTH as i64) as u32,
        None => DEFAULT_LENGTH,
    }
}

/// One discrete generative transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Drafting,
    Optimization,
    Revision,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Drafting => "drafting",
            Stage::Optimization => "optimization",
            Stage::Revision => "revision",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States a single run moves through, in order.
///
/// `Failed` is only reachable from `Drafting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Extracting,
    Drafting,
    Optimizing,
    Revising,
    Completed,
    Failed,
}

/// Inbound request: either `topic` (+ optional `length`) or a free-form `prompt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// The usable shape of a [`GenerationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestForm<'a> {
    Structured { topic: &'a str, length: Option<i64> },
    Prompt(&'a str),
}

impl GenerationRequest {
    pub fn structured(topic: impl Into<String>, length: i64) -> Self {
        Self {
            topic: Some(topic.into()),
            length: Some(length),
            prompt: None,
        }
    }

    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    /// Decide which form this request takes. A non-empty topic wins over a prompt.
    pub fn form(&self) -> Result<RequestForm<'_>> {
        if let Some(topic) = self.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(RequestForm::Structured {
                topic,
                length: self.length,
            });
        }
        if let Some(prompt) = self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            return Ok(RequestForm::Prompt(prompt));
        }
        Err(PipelineError::InvalidRequest(
            "expected a non-empty `topic` or `prompt`".into(),
        ))
    }
}

/// Normalized `{topic, length}` pair. Construct through [`ExtractedParameters::new`]
/// so the length is always in range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedParameters {
    topic: String,
    length: u32,
}

impl ExtractedParameters {
    pub fn new(topic: impl Into<String>, length: Option<i64>) -> Self {
        Self {
            topic: topic.into(),
            length: clamp_length(length),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn length(&self) -> u32 {
        self.length
    }
}

/// A markdown article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub markdown: String,
}

impl Draft {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
        }
    }
}

/// Structured SEO critique of a draft.
///
/// The wire shape is exact: unknown keys are rejected and every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SeoReport {
    pub title: String,
    pub meta_description: String,
    pub slug: String,
    pub headings: Vec<String>,
    pub revised_article: String,
    pub improvements: Vec<String>,
    pub keywords: Vec<String>,
    pub links: Vec<String>,
    pub readability_notes: String,
    pub call_to_action: String,
}

impl SeoReport {
    /// Semantic checks on top of the structural ones serde already enforces.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let required = [
            ("title", &self.title),
            ("slug", &self.slug),
            ("revisedArticle", &self.revised_article),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("`{}` is empty", name));
            }
        }
        Ok(())
    }

    /// JSON schema sent to the model as the structured-output contract.
    pub fn json_schema() -> Value {
        let string_list = json!({"type": "array", "items": {"type": "string"}});
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "metaDescription": {"type": "string"},
                "slug": {"type": "string"},
                "headings": string_list,
                "revisedArticle": {"type": "string"},
                "improvements": string_list,
                "keywords": string_list,
                "links": string_list,
                "readabilityNotes": {"type": "string"},
                "callToAction": {"type": "string"}
            },
            "required": [
                "title", "metaDescription", "slug", "headings", "revisedArticle",
                "improvements", "keywords", "links", "readabilityNotes", "callToAction"
            ],
            "additionalProperties": false
        })
    }
}

/// What the caller receives: markdown only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub content: String,
}

impl From<Draft> for FinalResponse {
    fn from(draft: Draft) -> Self {
        Self {
            content: draft.markdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> SeoReport {
        SeoReport {
            title: "Electric Bikes: A Buyer's Guide".into(),
            meta_description: "Everything to know before buying an e-bike.".into(),
            slug: "electric-bikes-buyers-guide".into(),
            headings: vec!["# Electric Bikes".into(), "## Range".into()],
            revised_article: "# Electric Bikes\n\nE-bikes are...".into(),
            improvements: vec!["Added keyword to H1".into()],
            keywords: vec!["electric bikes".into(), "e-bike range".into()],
            links: vec!["https://example.com/e-bike-laws".into()],
            readability_notes: "Short paragraphs, grade 8.".into(),
            call_to_action: "Book a test ride today.".into(),
        }
    }

    #[test]
    fn test_clamp_length() {
        assert_eq!(clamp_length(None), DEFAULT_LENGTH);
        assert_eq!(clamp_length(Some(12)), MAX_LENGTH);
        assert_eq!(clamp_length(Some(0)), MIN_LENGTH);
        assert_eq!(clamp_length(Some(-4)), MIN_LENGTH);
        assert_eq!(clamp_length(Some(7)), 7);
    }

    #[test]
    fn test_form_prefers_topic() {
        let req = GenerationRequest {
            topic: Some("remote work".into()),
            length: Some(3),
            prompt: Some("write about cats".into()),
        };
        assert_eq!(
            req.form().unwrap(),
            RequestForm::Structured {
                topic: "remote work",
                length: Some(3)
            }
        );
    }

    #[test]
    fn test_form_blank_topic_falls_to_prompt() {
        let req = GenerationRequest {
            topic: Some("   ".into()),
            length: None,
            prompt: Some(" write about electric bikes ".into()),
        };
        assert_eq!(req.form().unwrap(), RequestForm::Prompt("write about electric bikes"));
    }

    #[test]
    fn test_form_rejects_empty_request() {
        let err = GenerationRequest::default().form().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[test]
    fn test_request_deserializes_either_form() {
        let req: GenerationRequest = serde_json::from_str(r#"{"prompt": "hi"}"#).unwrap();
        assert_eq!(req, GenerationRequest::from_prompt("hi"));
        let req: GenerationRequest =
            serde_json::from_str(r#"{"topic": "remote work", "length": 12}"#).unwrap();
        assert_eq!(req, GenerationRequest::structured("remote work", 12));
    }

    #[test]
    fn test_extracted_parameters_are_clamped() {
        let params = ExtractedParameters::new("remote work", Some(12));
        assert_eq!(params.length(), MAX_LENGTH);
        assert_eq!(params.topic(), "remote work");
    }

    #[test]
    fn test_seo_report_roundtrip_preserves_fields() {
        let report = sample_report();
        let wire = serde_json::to_string(&report).unwrap();
        assert!(wire.contains("\"metaDescription\""));
        assert!(wire.contains("\"revisedArticle\""));
        let back: SeoReport = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_seo_report_rejects_missing_field() {
        let mut value = serde_json::to_value(sample_report()).unwrap();
        value.as_object_mut().unwrap().remove("revisedArticle");
        assert!(serde_json::from_value::<SeoReport>(value).is_err());
    }

    #[test]
    fn test_seo_report_rejects_unknown_field() {
        let mut value = serde_json::to_value(sample_report()).unwrap();
        value["readabilityScore"] = json!(71.5);
        assert!(serde_json::from_value::<SeoReport>(value).is_err());
    }

    #[test]
    fn test_seo_report_validate_empty_article() {
        let mut report = sample_report();
        report.revised_article = "  ".into();
        assert!(report.validate().unwrap_err().contains("revisedArticle"));
        assert!(sample_report().validate().is_ok());
    }

    #[test]
    fn test_schema_lists_every_field() {
        let schema = SeoReport::json_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 10);
        let props = schema["properties"].as_object().unwrap();
        for field in required {
            assert!(props.contains_key(field.as_str().unwrap()));
        }
    }

    #[test]
    fn test_final_response_from_draft() {
        let resp = FinalResponse::from(Draft::new("# Hello"));
        assert_eq!(serde_json::to_value(&resp).unwrap(), json!({"content": "# Hello"}));
    }
}
