//! The three model-backed stages of a blog run.
//!
//! Each stage owns its [`LlmCall`](crate::LlmCall)s and knows how to turn a
//! reply into a typed value. Sequencing and degrade decisions live in
//! [`Orchestrator`](crate::Orchestrator).

pub mod extractor;
pub mod optimizer;
pub mod writer;

pub use extractor::Extractor;
pub use optimizer::Optimizer;
pub use writer::Writer;
