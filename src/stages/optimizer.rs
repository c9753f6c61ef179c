//! SEO critique of a draft.

use crate::client::ResponseSchema;
use crate::config::{DefaultModel, StageTable};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::llm_call::LlmCall;
use crate::output_parser::ParseMode;
use crate::prompt::section;
use crate::types::{Draft, SeoReport, Stage};

const SYSTEM_PROMPT: &str = "\
Rewrite the blog article you are given to be SEO optimized. Use relevant keywords, \
improve readability, and make the content engaging for search engines. \
Return a single JSON object with exactly these keys:
  - title: the SEO title
  - metaDescription: at most 160 characters
  - slug: lowercase words joined by hyphens
  - headings: the H1 followed by the H2 headings, as markdown lines
  - revisedArticle: the revised article in markdown (keep length and format the same; only optimize for SEO)
  - improvements: the changes you made, one per item
  - keywords: relevant SEO keywords
  - links: suggested internal and external links
  - readabilityNotes: a short readability assessment
  - callToAction: one closing call to action
Do not add other keys.";

/// Produces an [`SeoReport`] for a draft, or fails. A report that does not
/// match the exact shape is never returned.
#[derive(Debug, Clone)]
pub struct Optimizer {
    call: LlmCall,
}

impl Optimizer {
    pub fn new(call: LlmCall) -> Self {
        let schema = ResponseSchema::new("seo_report", SeoReport::json_schema());
        Self {
            call: call
                .with_system(SYSTEM_PROMPT)
                .map_config(|c| c.with_schema(schema)),
        }
    }

    pub fn from_stages<'a>(stages: &StageTable, default_model: impl Into<DefaultModel<'a>>) -> Self {
        Self::new(LlmCall::from_settings(
            Stage::Optimization,
            stages.get(Stage::Optimization),
            default_model,
        ))
    }

    pub async fn optimize(&self, ctx: &ExecCtx, draft: &Draft) -> Result<SeoReport> {
        let report: SeoReport = self
            .call
            .invoke_json(ctx, section("Article", &draft.markdown), ParseMode::Strict)
            .await?;
        report
            .validate()
            .map_err(|reason| PipelineError::validation(Stage::Optimization, reason))?;
        Ok(report)
    }
}
