//! # Blog Pipeline
//!
//! Turns one free-form request into a finished, SEO-optimized markdown
//! article by running four model calls in a fixed order:
//!
//! 1. **Extraction**: prompt to `{topic, length}`, with a lenient fallback.
//! 2. **Drafting**: `{topic, length}` to a markdown draft. Mandatory.
//! 3. **Optimization**: draft to a strictly validated [`SeoReport`].
//! 4. **Revision**: draft plus report to the final article.
//!
//! Optimization and revision degrade to the initial draft instead of failing
//! the request. The caller only ever receives markdown as
//! [`FinalResponse::content`].
//!
//! ## Core Concepts
//!
//! - **[`Orchestrator`]**: sequences the stages and applies the degrade policy.
//! - **[`ExecCtx`]**: HTTP client, model [`Backend`](backend::Backend), retry
//!   policy and per-run cancellation.
//! - **[`LlmCall`]**: one stage's model, system prompt, generation parameters
//!   and deadline.
//! - **[`output_parser`]**: JSON and markdown recovery from messy model output.
//! - **[`server`]**: the `POST /generate-blog` endpoint.
//!
//! ## Quick Start
//!
//! ```no_run
//! use blog_pipeline::config::AppConfig;
//! use blog_pipeline::{GenerationRequest, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None)?;
//!     let ctx = config.exec_ctx()?;
//!     let orchestrator = Orchestrator::from_config(&config);
//!
//!     let request = GenerationRequest::from_prompt("a short post about e-bike range");
//!     let article = orchestrator.run(&ctx, &request).await?;
//!     println!("{}", article.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a provider
//!
//! ```
//! use blog_pipeline::{ExecCtx, GenerationRequest, MockBackend, Orchestrator};
//! use blog_pipeline::config::StageTable;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! // Every stage gets the same reply; the SEO report is unusable, so the
//! // draft is returned as is.
//! let ctx = ExecCtx::builder("http://unused")
//!     .backend(Arc::new(MockBackend::fixed("# Tea\n\nSteep for three minutes.")))
//!     .build()
//!     .unwrap();
//! let orchestrator = Orchestrator::new(&StageTable::default(), "mock");
//! let article = orchestrator
//!     .run(&ctx, &GenerationRequest::structured("tea", 2))
//!     .await
//!     .unwrap();
//! assert!(article.content.starts_with("# Tea"));
//! # });
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod exec_ctx;
pub mod llm_call;
pub mod orchestrator;
pub mod output_parser;
pub mod prompt;
pub mod relay;
pub mod server;
pub mod stages;
pub mod types;

pub use backend::{BackoffConfig, MockBackend, OllamaBackend, OpenAiBackend};
pub use client::{LlmConfig, ResponseSchema};
pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use exec_ctx::{Cancellation, ExecCtx, ExecCtxBuilder};
pub use llm_call::LlmCall;
pub use orchestrator::{Degradation, Orchestrator, RunOutcome};
pub use stages::{Extractor, Optimizer, Writer};
pub use types::{
    Draft, ExtractedParameters, FinalResponse, GenerationRequest, PipelineState, SeoReport, Stage,
};
