//! The top-level annotator: segment, fill, validate, correct, report.
//!
//! [`Annotator`] owns the immutable schema, the segmenter, and the shared
//! execution context, and exposes [`annotate`](Annotator::annotate),
//! [`estimate_cost`](Annotator::estimate_cost), and
//! [`annotate_batch`](Annotator::annotate_batch). Within one interview,
//! provider calls are strictly sequential; across a batch, interviews run
//! on a bounded worker pool and one interview's fatal failure never aborts
//! its siblings.

use crate::cost::{CostEstimate, CostEstimator, PricingTable};
use crate::ctx::AnnotateCtx;
use crate::error::{AnnotateError, Result, RunStage};
use crate::events::{emit, Event};
use crate::interview::{InterviewDocument, ProcessingMetadata};
use crate::schema::AnnotationSchema;
use crate::segmenter::TurnSegmenter;
use crate::strategy::{
    AnnotationOutcome, CompletedAnnotation, FillReport, FillStrategy, StrategyController,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

/// Tunables for a run, passed explicitly at construction.
#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    /// Corrective-call bound per interview. Exceeding it degrades the run
    /// to a partial result.
    pub max_corrections: u32,
    /// Lower the temperature by 0.2 on each correction (floored at 0.0).
    pub cool_down: bool,
    /// Sampling temperature for fill calls.
    pub temperature: f64,
    /// Completion token cap per call.
    pub max_output_tokens: u32,
    /// Rates for the pre-execution cost projection.
    pub pricing: PricingTable,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            max_corrections: 3,
            cool_down: true,
            temperature: 0.2,
            max_output_tokens: 4096,
            pricing: PricingTable::default(),
        }
    }
}

/// A finished run: the terminal outcome plus its processing metadata.
#[derive(Debug)]
pub struct AnnotationRun {
    /// Completed or partial document.
    pub outcome: AnnotationOutcome,
    /// What the run cost and how it behaved.
    pub metadata: ProcessingMetadata,
}

/// Persistence seam. Storage is an external collaborator; batch callers
/// must tolerate interleaved completion order across interviews.
pub trait AnnotationStore: Send + Sync {
    /// Persist a completed annotation with its metadata.
    fn save(
        &self,
        completed: &CompletedAnnotation,
        metadata: &ProcessingMetadata,
    ) -> anyhow::Result<()>;
}

/// Outcome counts and failure details for one batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Interviews processed.
    pub total: usize,
    /// Runs that produced a complete annotation.
    pub completed: usize,
    /// Runs that ended partial.
    pub partial: usize,
    /// Runs that failed fatally.
    pub failed: usize,
    /// One entry per fatal failure.
    pub failures: Vec<BatchFailure>,
}

/// One fatal per-interview failure in a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Id of the failed interview.
    pub interview_id: String,
    /// The stage the failure occurred in.
    pub stage: RunStage,
    /// The underlying error message.
    pub message: String,
}

/// Annotates interview documents against one schema via one provider.
pub struct Annotator {
    schema: Arc<AnnotationSchema>,
    segmenter: TurnSegmenter,
    ctx: AnnotateCtx,
    options: AnnotateOptions,
}

impl Annotator {
    /// Create an annotator. Validates the schema definition once, up front.
    pub fn new(schema: AnnotationSchema, ctx: AnnotateCtx) -> Result<Self> {
        schema.validate_definition()?;
        Ok(Self {
            schema: Arc::new(schema),
            segmenter: TurnSegmenter::default(),
            ctx,
            options: AnnotateOptions::default(),
        })
    }

    /// Replace the default segmenter configuration.
    pub fn with_segmenter(mut self, segmenter: TurnSegmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Replace the default options.
    pub fn with_options(mut self, options: AnnotateOptions) -> Self {
        self.options = options;
        self
    }

    /// The schema this annotator fills.
    pub fn schema(&self) -> &AnnotationSchema {
        &self.schema
    }

    /// Annotate one interview under the given strategy.
    ///
    /// Zero segmented turns is a valid degenerate case: the run continues
    /// with interview-level slots only. Validation failure degrades to a
    /// partial outcome; only provider/auth failures (after their retry
    /// budget) and cancellation are errors.
    pub async fn annotate(
        &self,
        interview: &InterviewDocument,
        strategy: FillStrategy,
    ) -> Result<AnnotationRun> {
        let started = Instant::now();
        emit(
            &self.ctx.event_handler,
            Event::RunStart {
                interview_id: interview.id.clone(),
                strategy: strategy.as_str(),
            },
        );

        let turns = self.segmenter.segment(&interview.raw_text);
        if turns.is_empty() {
            emit(
                &self.ctx.event_handler,
                Event::SegmentationEmpty {
                    interview_id: interview.id.clone(),
                },
            );
        }

        let estimate = CostEstimator::new(self.options.pricing.clone()).estimate(
            &self.schema,
            &turns,
            strategy,
        );

        let controller = StrategyController::new(&self.schema, &self.ctx, &self.options);
        let report = controller.fill(&interview.id, &turns, strategy).await?;

        let metadata = self.build_metadata(&report, estimate.dollars, started);
        emit(
            &self.ctx.event_handler,
            Event::RunEnd {
                interview_id: interview.id.clone(),
                coverage: report.outcome.coverage(),
                completed: report.outcome.is_complete(),
            },
        );

        Ok(AnnotationRun {
            outcome: report.outcome,
            metadata,
        })
    }

    /// Project the cost of annotating `interview` under `strategy`, without
    /// making any provider call.
    pub fn estimate_cost(
        &self,
        interview: &InterviewDocument,
        strategy: FillStrategy,
    ) -> CostEstimate {
        let turns = self.segmenter.segment(&interview.raw_text);
        CostEstimator::new(self.options.pricing.clone()).estimate(&self.schema, &turns, strategy)
    }

    /// Annotate many interviews on a bounded worker pool.
    ///
    /// Calls within one interview stay strictly sequential; up to
    /// `parallelism` interviews run concurrently. Failures are isolated per
    /// interview and accumulated into the summary.
    pub async fn annotate_batch(
        &self,
        interviews: &[InterviewDocument],
        strategy: FillStrategy,
        parallelism: usize,
    ) -> (Vec<(String, Result<AnnotationRun>)>, BatchSummary) {
        let results: Vec<(String, Result<AnnotationRun>)> = stream::iter(interviews)
            .map(|interview| async move {
                let result = self.annotate(interview, strategy).await;
                emit(
                    &self.ctx.event_handler,
                    Event::BatchItemDone {
                        interview_id: interview.id.clone(),
                        ok: result.is_ok(),
                    },
                );
                (interview.id.clone(), result)
            })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await;

        let mut summary = BatchSummary {
            total: results.len(),
            ..BatchSummary::default()
        };
        for (interview_id, result) in &results {
            match result {
                Ok(run) if run.outcome.is_complete() => summary.completed += 1,
                Ok(_) => summary.partial += 1,
                Err(error) => {
                    summary.failed += 1;
                    let stage = match error {
                        AnnotateError::RunFailed { stage, .. } => *stage,
                        _ => RunStage::Filling,
                    };
                    summary.failures.push(BatchFailure {
                        interview_id: interview_id.clone(),
                        stage,
                        message: error.to_string(),
                    });
                }
            }
        }
        (results, summary)
    }

    /// Assemble run metadata. Confidence starts from coverage and counts
    /// slots that needed correction at half weight.
    fn build_metadata(
        &self,
        report: &FillReport,
        estimated_cost: f64,
        started: Instant,
    ) -> ProcessingMetadata {
        let required = report
            .outcome
            .document()
            .nodes()
            .iter()
            .filter(|n| n.required)
            .count()
            .max(1);
        let uncertainty = 0.5 * report.uncertain_slots.len() as f64 / required as f64;
        let overall_confidence = (report.outcome.coverage() - uncertainty).clamp(0.0, 1.0);

        ProcessingMetadata {
            provider: self.ctx.gateway.name().to_string(),
            model: self.ctx.provider.model.clone(),
            attempt_count: report.attempt_count,
            correction_count: report.correction_count,
            elapsed_ms: started.elapsed().as_millis() as u64,
            token_usage: report.usage,
            estimated_cost,
            overall_confidence,
            uncertain_slots: report.uncertain_slots.clone(),
        }
    }
}
