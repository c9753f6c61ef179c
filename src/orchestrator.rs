//! Sequencing of one blog run.
//!
//! ```text
//!  Received ─▶ Extracting ─▶ Drafting ─▶ Optimizing ─▶ Revising ─▶ Completed
//!   (topic given: skip)         │             │             │
//!                               ▼             └─ degrade ───┴──▶ Completed
//!                             Failed                      (initial draft)
//! ```
//!
//! Only drafting is mandatory. Extraction falls back to the prompt as topic,
//! optimization and revision fall back to the initial draft. Cancellation is
//! never absorbed by a fallback.

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{AppConfig, DefaultModel, StageTable};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::prompt::preview;
use crate::stages::{Extractor, Optimizer, Writer};
use crate::types::{
    Draft, ExtractedParameters, FinalResponse, GenerationRequest, PipelineState, RequestForm, Stage,
};

/// A non-mandatory stage that did not contribute to the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// Extraction failed; the prompt became the topic with the default length.
    ExtractionFallback,
    /// The SEO report was unusable; revision was skipped.
    OptimizationSkipped,
    /// Revision failed; the initial draft was returned.
    RevisionFallback,
}

/// Everything a run produced, for callers that want more than the markdown.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub response: FinalResponse,
    pub parameters: ExtractedParameters,
    /// States entered, in order.
    pub trace: Vec<PipelineState>,
    pub degradations: Vec<Degradation>,
}

impl RunOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// Drives extraction, drafting, optimization and one revision.
///
/// Holds no per-request state; share one instance across requests behind an
/// `Arc` and give each run its own [`ExecCtx`] cancellation.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    extractor: Extractor,
    writer: Writer,
    optimizer: Optimizer,
}

struct Tracker {
    trace: Vec<PipelineState>,
    degradations: Vec<Degradation>,
}

impl Tracker {
    fn enter(&mut self, state: PipelineState) {
        debug!(?state, "state transition");
        self.trace.push(state);
    }

    fn degrade(&mut self, degradation: Degradation) {
        self.degradations.push(degradation);
    }
}

impl Orchestrator {
    pub fn new<'a>(stages: &StageTable, default_model: impl Into<DefaultModel<'a>>) -> Self {
        let default_model = default_model.into();
        Self::from_parts(
            Extractor::from_stages(stages, default_model),
            Writer::from_stages(stages, default_model),
            Optimizer::from_stages(stages, default_model),
        )
    }

    pub fn from_parts(extractor: Extractor, writer: Writer, optimizer: Optimizer) -> Self {
        Self {
            extractor,
            writer,
            optimizer,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.stages, config.model_defaults())
    }

    /// Run the pipeline and return only the final markdown.
    pub async fn run(&self, ctx: &ExecCtx, request: &GenerationRequest) -> Result<FinalResponse> {
        self.run_detailed(ctx, request).await.map(|outcome| outcome.response)
    }

    /// Run the pipeline and report the states visited and any degradations.
    pub async fn run_detailed(&self, ctx: &ExecCtx, request: &GenerationRequest) -> Result<RunOutcome> {
        let span = info_span!("pipeline.run", backend = ctx.backend.name());
        self.execute(ctx, request).instrument(span).await
    }

    async fn execute(&self, ctx: &ExecCtx, request: &GenerationRequest) -> Result<RunOutcome> {
        let form = request.form()?;
        let mut tracker = Tracker {
            trace: Vec::with_capacity(6),
            degradations: Vec::new(),
        };
        tracker.enter(PipelineState::Received);
        ctx.check_cancelled()?;

        let parameters = match form {
            RequestForm::Structured { topic, length } => ExtractedParameters::new(topic, length),
            RequestForm::Prompt(prompt) => {
                info!(prompt = %preview(prompt, 60), "received prompt");
                tracker.enter(PipelineState::Extracting);
                let (parameters, fell_back) = self.extractor.extract_or_fallback(ctx, prompt).await?;
                if fell_back {
                    tracker.degrade(Degradation::ExtractionFallback);
                }
                parameters
            }
        };
        info!(topic = %parameters.topic(), length = parameters.length(), "generating article");

        tracker.enter(PipelineState::Drafting);
        let draft = match self.writer.write_draft(ctx, &parameters).await {
            Ok(draft) => draft,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                error!(error = %e, auth = e.is_auth(), "drafting failed");
                tracker.enter(PipelineState::Failed);
                return Err(PipelineError::Fatal {
                    stage: Stage::Drafting,
                });
            }
        };

        let content = self.refine(ctx, &parameters, draft, &mut tracker).await?;

        tracker.enter(PipelineState::Completed);
        if !tracker.degradations.is_empty() {
            info!(degradations = ?tracker.degradations, "completed with degraded output");
        }
        Ok(RunOutcome {
            response: content.into(),
            parameters,
            trace: tracker.trace,
            degradations: tracker.degradations,
        })
    }

    /// Optimize then revise; any failure other than cancellation yields `draft`.
    async fn refine(
        &self,
        ctx: &ExecCtx,
        parameters: &ExtractedParameters,
        draft: Draft,
        tracker: &mut Tracker,
    ) -> Result<Draft> {
        tracker.enter(PipelineState::Optimizing);
        let report = match self.optimizer.optimize(ctx, &draft).await {
            Ok(report) => report,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "optimization failed; returning the initial draft");
                tracker.degrade(Degradation::OptimizationSkipped);
                return Ok(draft);
            }
        };

        tracker.enter(PipelineState::Revising);
        match self.writer.revise(ctx, parameters, &draft, &report).await {
            Ok(revised) => Ok(revised),
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "revision failed; returning the initial draft");
                tracker.degrade(Degradation::RevisionFallback);
                Ok(draft)
            }
        }
    }
}
