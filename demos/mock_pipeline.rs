//! Example: the whole pipeline against MockBackend, no provider needed.
//!
//! Run with: `cargo run --example mock_pipeline`
//! Add `RUST_LOG=blog_pipeline=debug` to see every state transition.

use blog_pipeline::backend::{LlmRequest, MockReply};
use blog_pipeline::config::StageTable;
use blog_pipeline::{ExecCtx, GenerationRequest, MockBackend, Orchestrator, Stage};
use serde_json::json;
use std::sync::Arc;

const DRAFT: &str = "# Electric Bikes\n\nE-bikes make hills disappear.\n\n## Range\n\nMost get 40-80 km per charge.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let report = json!({
        "title": "Electric Bikes: Range, Cost and Commuting",
        "metaDescription": "What an e-bike really costs and how far it goes.",
        "slug": "electric-bikes-range-cost",
        "headings": ["# Electric Bikes", "## How Far Can an E-Bike Go?"],
        "revisedArticle": DRAFT,
        "improvements": ["Question-style H2 for featured snippets"],
        "keywords": ["electric bikes", "e-bike range"],
        "links": ["/guides/e-bike-batteries"],
        "readabilityNotes": "Short paragraphs, plain words.",
        "callToAction": "Book a test ride this weekend."
    })
    .to_string();

    // Reply by stage, the way a real model would see each request.
    let mock = Arc::new(MockBackend::routed(move |req: &LlmRequest| match req.stage {
        Stage::Extraction => MockReply::text(r#"{"topic": "electric bikes", "length": 3}"#),
        Stage::Drafting => MockReply::text(DRAFT),
        Stage::Optimization => MockReply::text(report.clone()),
        Stage::Revision => MockReply::text(
            "# Electric Bikes\n\nE-bikes make hills disappear.\n\n## How Far Can an E-Bike Go?\n\n\
             Most get 40-80 km per charge.\n\nBook a test ride this weekend.",
        ),
    }));

    let ctx = ExecCtx::builder("http://unused").backend(mock.clone()).build()?;
    let orchestrator = Orchestrator::new(&StageTable::default(), "mock-model");

    let request = GenerationRequest::from_prompt("three paragraphs on electric bikes for commuters");
    let outcome = orchestrator.run_detailed(&ctx, &request).await?;

    println!("Parameters: {:?}", outcome.parameters);
    println!("States:     {:?}", outcome.trace);
    println!("Degraded:   {:?}", outcome.degradations);
    println!("Calls:      {}", mock.call_count());
    println!("\n{}", outcome.response.content);

    Ok(())
}
