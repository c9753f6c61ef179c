//! Draft writing and the one revision pass.

use tracing::debug;

use crate::backend::ChatMessage;
use crate::config::{DefaultModel, StageTable};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::llm_call::LlmCall;
use crate::prompt::{render, section};
use crate::types::{Draft, ExtractedParameters, SeoReport, Stage};

const SYSTEM_PROMPT: &str = "\
You are an experienced blog writer. Your output format is markdown only: \
no preamble, no closing remarks, no code fences around the article. \
Adhere to the inputs provided by the user.";

const DRAFT_TEMPLATE: &str = "\
Write a detailed blog post about {topic}. The blog post should be approximately \
{length} paragraphs long and cover key aspects of the topic.";

const REVISION_TEMPLATE: &str = "\
Revise your article using the SEO report below. Use `revisedArticle` as guidance, \
apply every item in `improvements`, and work the `keywords` in naturally. \
Keep your own voice from the first draft, stay on {topic} and keep roughly \
{length} paragraphs. Return only the final article in markdown.";

/// Writes the initial draft and, given an SEO report, the revised one.
///
/// The revision continues the drafting conversation: the model sees its own
/// draft as the previous assistant turn.
#[derive(Debug, Clone)]
pub struct Writer {
    draft_call: LlmCall,
    revision_call: LlmCall,
}

impl Writer {
    pub fn new(draft_call: LlmCall, revision_call: LlmCall) -> Self {
        Self {
            draft_call: draft_call.with_system(SYSTEM_PROMPT),
            revision_call: revision_call.with_system(SYSTEM_PROMPT),
        }
    }

    pub fn from_stages<'a>(stages: &StageTable, default_model: impl Into<DefaultModel<'a>>) -> Self {
        let default_model = default_model.into();
        Self::new(
            LlmCall::from_settings(Stage::Drafting, stages.get(Stage::Drafting), default_model),
            LlmCall::from_settings(Stage::Revision, stages.get(Stage::Revision), default_model),
        )
    }

    fn draft_prompt(params: &ExtractedParameters) -> String {
        let length = params.length().to_string();
        render(DRAFT_TEMPLATE, &[("topic", params.topic()), ("length", length.as_str())])
    }

    pub async fn write_draft(&self, ctx: &ExecCtx, params: &ExtractedParameters) -> Result<Draft> {
        let markdown = self
            .draft_call
            .invoke_markdown(ctx, Self::draft_prompt(params), Vec::new())
            .await?;
        debug!(chars = markdown.len(), "draft written");
        Ok(Draft::new(markdown))
    }

    pub async fn revise(
        &self,
        ctx: &ExecCtx,
        params: &ExtractedParameters,
        draft: &Draft,
        report: &SeoReport,
    ) -> Result<Draft> {
        let history = vec![
            ChatMessage::user(Self::draft_prompt(params)),
            ChatMessage::assistant(draft.markdown.clone()),
        ];
        let length = params.length().to_string();
        let instructions = render(
            REVISION_TEMPLATE,
            &[("topic", params.topic()), ("length", length.as_str())],
        );
        let report_json = serde_json::to_string_pretty(report)?;
        let prompt = format!("{}\n\n{}", instructions, section("SEO Report", &report_json));

        let markdown = self.revision_call.invoke_markdown(ctx, prompt, history).await?;
        debug!(chars = markdown.len(), "revision written");
        Ok(Draft::new(markdown))
    }
}
