//! # Transcript Annotator
//!
//! Schema-driven annotation of interview transcripts via LLM providers.
//!
//! This crate reconciles a non-deterministic external service with a hard
//! structural contract: it segments a transcript into speaker turns, builds
//! a schema-shaped skeleton document with typed "unfilled" sentinels, fills
//! it through provider calls, validates the result, and runs a bounded
//! correction loop on validation failure. Partial coverage is a first-class
//! outcome, not an error.
//!
//! ## Core Concepts
//!
//! - **[`TurnSegmenter`]** — splits raw transcript text into ordered
//!   speaker turns; label rules, aliases, and exclusions are data.
//! - **[`AnnotationSchema`]** — declarative slot tree (scalar, enum, list,
//!   struct, repeated-per-turn), loaded once and shared read-only.
//! - **[`SkeletonBuilder`]** — instantiates schema × turns into a
//!   [`SkeletonDocument`] whose every leaf starts
//!   [`Unfilled`](skeleton::SlotState::Unfilled).
//! - **[`ProviderGateway`]** — one interface over heterogeneous backends,
//!   selected at construction; typed errors, transport backoff.
//! - **[`ValidationEngine`]** — pure, accumulating slot validation.
//! - **[`CorrectionLoop`]** — explicit fill/validate/correct state machine
//!   with a load-bearing attempt bound.
//! - **[`StrategyController`]** — monolithic (one call) or progressive
//!   (many small calls over a shared cached context) filling.
//! - **[`ExtractionAdapter`]** — flattens a completed annotation into
//!   relational records.
//!
//! ## Quick Start
//!
//! ```no_run
//! use transcript_annotator::{
//!     AnnotateCtx, Annotator, FillStrategy, InterviewDocument, ProviderConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = transcript_annotator::AnnotationSchema::from_json(
//!         &std::fs::read_to_string("schema.json")?,
//!     )?;
//!     let ctx = AnnotateCtx::builder(
//!         ProviderConfig::new("http://localhost:11434", "llama3.2:3b"),
//!     )
//!     .build();
//!     let annotator = Annotator::new(schema, ctx)?;
//!
//!     let interview = InterviewDocument::new("int-01", "I: Hello?\nP: Hi.");
//!     let estimate = annotator.estimate_cost(&interview, FillStrategy::Progressive);
//!     println!("projected: ${:.4} over {} calls", estimate.dollars, estimate.calls);
//!
//!     let run = annotator.annotate(&interview, FillStrategy::Progressive).await?;
//!     println!("coverage: {:.0}%", run.outcome.coverage() * 100.0);
//!     Ok(())
//! }
//! ```

pub mod annotator;
pub mod corrector;
pub mod cost;
pub mod ctx;
pub mod error;
pub mod events;
pub mod extract;
pub mod gateway;
pub mod interview;
pub mod parsing;
pub mod prompt;
pub mod schema;
pub mod segmenter;
pub mod skeleton;
pub mod strategy;
pub mod validation;

#[cfg(test)]
pub(crate) mod testutil;

pub use annotator::{
    AnnotateOptions, AnnotationRun, AnnotationStore, Annotator, BatchFailure, BatchSummary,
};
pub use corrector::{CorrectionLoop, LoopState};
pub use cost::{CostEstimate, CostEstimator, PricingTable};
pub use ctx::{AnnotateCtx, AnnotateCtxBuilder};
pub use error::{AnnotateError, ProviderError, Result, RunStage};
pub use events::{Event, EventHandler, FnEventHandler};
pub use extract::{ExtractedRecords, ExtractionAdapter, ThemeTaxonomy};
pub use gateway::{
    BackoffConfig, MockGateway, OllamaGateway, OutputCapability, ProviderConfig, ProviderGateway,
};
#[cfg(feature = "openai")]
pub use gateway::OpenAiGateway;
pub use interview::{InterviewDocument, ProcessingMetadata, SpeakerRole, TokenUsage, Turn};
pub use schema::{AnnotationSchema, SlotKind, SlotSpec};
pub use segmenter::{SegmenterConfig, TurnSegmenter};
pub use skeleton::{SkeletonBuilder, SkeletonDocument, SlotState};
pub use strategy::{
    AnnotationOutcome, CompletedAnnotation, FillStrategy, PartialResult, StrategyController,
};
pub use validation::{ValidationEngine, ValidationError, ViolationKind};
