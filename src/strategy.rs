//! Fill strategies and the controller that drives them.
//!
//! **Monolithic** fills the whole document in one call: cheapest and
//! fastest, but large documents risk truncation or drift — accepted as a
//! policy tradeoff, not a bug. **Progressive** decomposes the document into
//! ordered fill-tasks, one small call each, every call carrying the same
//! shared context (schema instructions + transcript) so provider-side
//! caching discounts it. Progressive calls run strictly sequentially per
//! interview; later tasks may read slots filled by earlier ones.
//!
//! Both strategies terminate in a [`CompletedAnnotation`] or a
//! [`PartialResult`] with a coverage fraction — partial success is
//! first-class and reportable, not mere failure.

use crate::annotator::AnnotateOptions;
use crate::corrector::{correction_prompt, CorrectionLoop, LoopState};
use crate::ctx::AnnotateCtx;
use crate::error::{AnnotateError, Result, RunStage};
use crate::events::{emit, Event};
use crate::gateway::{with_backoff, CallStats, OutputCapability, ProviderRequest, ProviderResponse};
use crate::interview::{ProcessingMetadata, TokenUsage, Turn};
use crate::parsing;
use crate::prompt;
use crate::schema::AnnotationSchema;
use crate::skeleton::{SkeletonBuilder, SkeletonDocument};
use crate::validation::{ValidationEngine, ValidationError};
use serde_json::{json, Value};

/// Which fill strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    /// One call fills everything.
    Monolithic,
    /// Many small calls over a shared cached context.
    Progressive,
}

impl FillStrategy {
    /// Stable name used in events and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStrategy::Monolithic => "monolithic",
            FillStrategy::Progressive => "progressive",
        }
    }
}

/// One progressive fill-task: a cohesive group of slot paths filled by a
/// single call.
#[derive(Debug, Clone)]
pub struct FillTask {
    /// Task label, used in events and prompts.
    pub name: String,
    /// Task-specific instruction.
    pub instruction: String,
    /// The slot paths this task fills.
    pub paths: Vec<String>,
}

/// Enumerate the progressive fill-tasks for a schema over a turn list:
/// one task per top-level interview slot (its leaves travel together), then
/// one task per turn. Execution order is exactly this order.
pub fn enumerate_tasks(schema: &AnnotationSchema, turns: &[Turn]) -> Vec<FillTask> {
    let mut tasks = Vec::new();
    let interview_leaves = schema.interview_leaves();
    for slot in &schema.interview_slots {
        let prefix = format!("{}.", slot.name);
        let paths: Vec<String> = interview_leaves
            .iter()
            .filter(|l| l.path == slot.name || l.path.starts_with(&prefix))
            .map(|l| l.path.clone())
            .collect();
        let instruction = if slot.description.is_empty() {
            format!(
                "Determine `{}` from the whole transcript.",
                slot.name
            )
        } else {
            slot.description.clone()
        };
        tasks.push(FillTask {
            name: format!("interview:{}", slot.name),
            instruction,
            paths,
        });
    }
    if !schema.turn_slots.is_empty() {
        for turn in turns {
            tasks.push(FillTask {
                name: format!("turn:{}", turn.index),
                instruction: format!(
                    "Annotate turn {} only, reading earlier turns for context.",
                    turn.index
                ),
                paths: schema
                    .turn_leaves(turn.index)
                    .into_iter()
                    .map(|l| l.path)
                    .collect(),
            });
        }
    }
    tasks
}

/// A document with zero unfilled required nodes and zero validation errors.
#[derive(Debug, Clone)]
pub struct CompletedAnnotation {
    /// Id of the annotated interview.
    pub interview_id: String,
    /// The fully filled document.
    pub document: SkeletonDocument,
}

impl CompletedAnnotation {
    /// The annotation as a nested JSON tree mirroring the schema. Contains
    /// no sentinels: every leaf is resolved.
    pub fn to_value(&self) -> Value {
        self.document.to_value()
    }

    /// The persisted form: the annotation tree plus processing metadata.
    pub fn serialize_with(&self, metadata: &ProcessingMetadata) -> Value {
        json!({
            "interview_id": self.interview_id,
            "schema": self.document.schema_name(),
            "annotation": self.to_value(),
            "metadata": metadata,
        })
    }
}

/// A run that ended with required slots unfilled or invalid. First-class:
/// carries the document as far as it got, the coverage fraction, and the
/// residual errors.
#[derive(Debug, Clone)]
pub struct PartialResult {
    /// Id of the interview.
    pub interview_id: String,
    /// The document as far as the run got.
    pub document: SkeletonDocument,
    /// Fraction of required slots holding a valid value.
    pub coverage: f64,
    /// Violations remaining at run end.
    pub errors: Vec<ValidationError>,
}

/// Terminal state of a fill run.
#[derive(Debug, Clone)]
pub enum AnnotationOutcome {
    /// Every required slot valid.
    Completed(CompletedAnnotation),
    /// Coverage below 1.0 or residual violations.
    Partial(PartialResult),
}

impl AnnotationOutcome {
    /// Whether the run completed fully.
    pub fn is_complete(&self) -> bool {
        matches!(self, AnnotationOutcome::Completed(_))
    }

    /// Coverage fraction at run end.
    pub fn coverage(&self) -> f64 {
        match self {
            AnnotationOutcome::Completed(_) => 1.0,
            AnnotationOutcome::Partial(p) => p.coverage,
        }
    }

    /// The underlying document, in either state.
    pub fn document(&self) -> &SkeletonDocument {
        match self {
            AnnotationOutcome::Completed(c) => &c.document,
            AnnotationOutcome::Partial(p) => &p.document,
        }
    }
}

/// What a fill run reports back to the annotator.
#[derive(Debug)]
pub struct FillReport {
    /// Terminal outcome.
    pub outcome: AnnotationOutcome,
    /// Aggregated token usage across every call.
    pub usage: TokenUsage,
    /// Total provider call attempts, including transport retries.
    pub attempt_count: u32,
    /// Corrective calls issued.
    pub correction_count: u32,
    /// Paths whose values only arrived after correction.
    pub uncertain_slots: Vec<String>,
}

/// Orchestrates one interview's fill: skeleton, strategy calls, validation,
/// and the bounded correction loop.
pub struct StrategyController<'a> {
    schema: &'a AnnotationSchema,
    ctx: &'a AnnotateCtx,
    options: &'a AnnotateOptions,
}

impl<'a> StrategyController<'a> {
    /// Create a controller over shared read-only schema, context, options.
    pub fn new(
        schema: &'a AnnotationSchema,
        ctx: &'a AnnotateCtx,
        options: &'a AnnotateOptions,
    ) -> Self {
        Self {
            schema,
            ctx,
            options,
        }
    }

    /// Run the full fill-validate-correct cycle for one interview.
    ///
    /// Terminal provider failures are wrapped with the interview id and the
    /// stage they occurred in; validation failure is never an error here —
    /// it degrades to [`AnnotationOutcome::Partial`].
    pub async fn fill(
        &self,
        interview_id: &str,
        turns: &[Turn],
        strategy: FillStrategy,
    ) -> Result<FillReport> {
        let mut doc = SkeletonBuilder::build(self.schema, turns);
        let shared = prompt::shared_context(self.schema, turns);
        let mut usage = TokenUsage::default();
        let mut attempts = 0u32;
        let mut uncertain: Vec<String> = Vec::new();

        // Structured-output gateways enforce the shape provider-side and
        // repair internally, short-circuiting the correction loop.
        let structured = self.ctx.gateway.capability() == OutputCapability::StructuredOutput;
        let max_corrections = if structured {
            0
        } else {
            self.options.max_corrections
        };
        let mut lp = CorrectionLoop::new(max_corrections);

        // --- Filling ---
        match strategy {
            FillStrategy::Monolithic => {
                let shape = structured.then(|| self.schema.response_shape(turns.len()));
                let user = prompt::monolithic_prompt(&doc);
                let response = self
                    .call(
                        "fill:monolithic",
                        &shared,
                        &user,
                        self.options.temperature,
                        shape,
                        &mut usage,
                        &mut attempts,
                    )
                    .await
                    .map_err(|e| wrap_stage(e, interview_id, RunStage::Filling))?;
                // Malformed output applies nothing; validation then flags
                // every required slot, which is exactly the retry signal.
                if let Ok(tree) = parsing::parse_model_json(&response.content) {
                    apply_response(&mut doc, &tree);
                }
            }
            FillStrategy::Progressive => {
                for task in enumerate_tasks(self.schema, turns) {
                    self.ctx.check_cancelled()?;
                    let user = prompt::task_prompt(&task.name, &task.paths, &task.instruction, &doc);
                    let response = self
                        .call(
                            &format!("fill:{}", task.name),
                            &shared,
                            &user,
                            self.options.temperature,
                            None,
                            &mut usage,
                            &mut attempts,
                        )
                        .await
                        .map_err(|e| wrap_stage(e, interview_id, RunStage::Filling))?;
                    if let Ok(value) = parsing::parse_model_json(&response.content) {
                        apply_response(&mut doc, &value);
                    }
                }
            }
        }
        lp.filled();

        // --- Validate / correct ---
        let mut errors = ValidationEngine::validate(&doc, self.schema);
        if !errors.is_empty() {
            emit(
                &self.ctx.event_handler,
                Event::ValidationFailed {
                    error_count: errors.len(),
                },
            );
        }
        let mut temperature = self.options.temperature;
        while !lp.is_terminal() {
            match lp.validated(errors.len()) {
                LoopState::Succeeded | LoopState::Failed => break,
                LoopState::Correcting => {
                    if self.options.cool_down {
                        temperature = (temperature - 0.2).max(0.0);
                    }
                    emit(
                        &self.ctx.event_handler,
                        Event::CorrectionStart {
                            attempt: lp.attempts(),
                            error_count: errors.len(),
                        },
                    );
                    let user = correction_prompt(&errors, &doc);
                    let response = self
                        .call(
                            &format!("correct:{}", lp.attempts()),
                            &shared,
                            &user,
                            temperature,
                            None,
                            &mut usage,
                            &mut attempts,
                        )
                        .await
                        .map_err(|e| wrap_stage(e, interview_id, RunStage::Correcting))?;
                    // A malformed correction response is treated as a schema
                    // violation: it consumes the attempt and loops.
                    if let Ok(value) = parsing::parse_model_json(&response.content) {
                        uncertain.extend(apply_response(&mut doc, &value));
                    }
                    lp.corrected();
                    errors = ValidationEngine::validate(&doc, self.schema);
                }
                // filled() has run, so Filling/Validating cannot reappear.
                _ => break,
            }
        }

        uncertain.sort();
        uncertain.dedup();

        let coverage = valid_coverage(&doc, &errors);
        let outcome = if lp.state() == LoopState::Succeeded {
            AnnotationOutcome::Completed(CompletedAnnotation {
                interview_id: interview_id.to_string(),
                document: doc,
            })
        } else {
            AnnotationOutcome::Partial(PartialResult {
                interview_id: interview_id.to_string(),
                document: doc,
                coverage,
                errors,
            })
        };

        Ok(FillReport {
            outcome,
            usage,
            attempt_count: attempts,
            correction_count: lp.attempts(),
            uncertain_slots: uncertain,
        })
    }

    /// One gateway call with transport retry, event emission, and
    /// usage/attempt accounting.
    async fn call(
        &self,
        task: &str,
        system: &str,
        user: &str,
        temperature: f64,
        response_shape: Option<Value>,
        usage: &mut TokenUsage,
        attempts: &mut u32,
    ) -> Result<ProviderResponse> {
        emit(
            &self.ctx.event_handler,
            Event::CallStart {
                task: task.to_string(),
            },
        );

        let request = ProviderRequest {
            system: system.to_string(),
            user: user.to_string(),
            temperature,
            max_tokens: self.options.max_output_tokens,
            response_shape,
        };

        let task_name = task.to_string();
        let event_handler = self.ctx.event_handler.clone();
        let mut on_retry = |attempt: u32, delay: std::time::Duration, reason: &str| {
            emit(
                &event_handler,
                Event::TransportRetry {
                    task: task_name.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let mut stats = CallStats::default();
        let result = with_backoff(
            &self.ctx.gateway,
            &self.ctx.client,
            &self.ctx.provider,
            &request,
            &self.ctx.backoff,
            self.ctx.cancel_flag(),
            &mut stats,
            Some(&mut on_retry),
        )
        .await;
        *attempts += stats.attempts;

        emit(
            &self.ctx.event_handler,
            Event::CallEnd {
                task: task.to_string(),
                ok: result.is_ok(),
            },
        );

        let response = result?;
        if let Some(u) = response.usage {
            usage.absorb(u);
        }
        Ok(response)
    }
}

/// Merge a model response into the document, accepting either the flat
/// `{path: value}` form the prompts ask for or a nested tree mirroring the
/// schema (models drift between the two). Returns the paths applied.
fn apply_response(doc: &mut SkeletonDocument, value: &Value) -> Vec<String> {
    let mut applied = doc.apply_flat(value);
    applied.extend(doc.apply_tree(value));
    applied.sort();
    applied.dedup();
    applied
}

/// Coverage per the glossary: the fraction of required slots holding a
/// *valid* value at run end. A required slot named in the residual error
/// list does not count, filled or not.
fn valid_coverage(doc: &SkeletonDocument, errors: &[ValidationError]) -> f64 {
    let required: Vec<_> = doc.nodes().iter().filter(|n| n.required).collect();
    if required.is_empty() {
        return 1.0;
    }
    let error_paths: std::collections::HashSet<&str> =
        errors.iter().map(|e| e.slot_path.as_str()).collect();
    let valid = required
        .iter()
        .filter(|n| n.state.is_filled() && !error_paths.contains(n.path.as_str()))
        .count();
    valid as f64 / required.len() as f64
}

fn wrap_stage(error: AnnotateError, interview_id: &str, stage: RunStage) -> AnnotateError {
    match error {
        AnnotateError::Cancelled => AnnotateError::Cancelled,
        other => AnnotateError::RunFailed {
            interview_id: interview_id.to_string(),
            stage,
            source: Box::new(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::AnnotateOptions;
    use crate::error::ProviderError;
    use crate::gateway::{BackoffConfig, MockGateway, MockReply, ProviderConfig};
    use crate::interview::SpeakerRole;
    use crate::testutil::{complete_fill, study_schema, three_turns};
    use std::sync::Arc;

    fn ctx_with(mock: Arc<MockGateway>) -> AnnotateCtx {
        AnnotateCtx::builder(ProviderConfig::new("http://unused", "test-model"))
            .gateway(mock)
            .backoff(BackoffConfig::none())
            .build()
    }

    /// Full-document tree answer for the study schema over three turns.
    fn full_tree() -> Value {
        let mut doc = SkeletonBuilder::build(&study_schema(), &three_turns());
        for (path, value) in complete_fill() {
            doc.set_value(&path, value);
        }
        doc.to_value()
    }

    /// Flat per-task replies, in task enumeration order.
    fn progressive_replies(turns: &[Turn]) -> Vec<MockReply> {
        let fill: std::collections::HashMap<String, Value> =
            complete_fill_for(turns).into_iter().collect();
        enumerate_tasks(&study_schema(), turns)
            .into_iter()
            .map(|task| {
                let mut obj = serde_json::Map::new();
                for path in &task.paths {
                    if let Some(v) = fill.get(path) {
                        obj.insert(path.clone(), v.clone());
                    }
                }
                MockReply::content(Value::Object(obj).to_string())
            })
            .collect()
    }

    fn complete_fill_for(turns: &[Turn]) -> Vec<(String, Value)> {
        let mut fill: Vec<(String, Value)> = complete_fill()
            .into_iter()
            .filter(|(p, _)| !p.starts_with("turns["))
            .collect();
        for t in turns {
            fill.push((format!("turns[{}].emotion", t.index), json!("calm")));
            fill.push((format!("turns[{}].evidence", t.index), json!([])));
        }
        fill
    }

    fn many_turns(n: usize) -> Vec<Turn> {
        (1..=n)
            .map(|i| {
                let role = if i % 2 == 1 {
                    SpeakerRole::Interviewer
                } else {
                    SpeakerRole::Participant
                };
                Turn::new(i, role, format!("Utterance number {}.", i))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_monolithic_completes_on_full_response() {
        let mock = Arc::new(MockGateway::fixed(full_tree().to_string()));
        let ctx = ctx_with(mock.clone());
        let options = AnnotateOptions::default();
        let schema = study_schema();
        let controller = StrategyController::new(&schema, &ctx, &options);

        let report = controller
            .fill("int-01", &three_turns(), FillStrategy::Monolithic)
            .await
            .unwrap();

        assert!(report.outcome.is_complete());
        assert_eq!(report.outcome.coverage(), 1.0);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(report.correction_count, 0);
        assert!(report.uncertain_slots.is_empty());
        assert!(report.usage.total() > 0);
    }

    #[tokio::test]
    async fn test_progressive_runs_one_call_per_task_in_order() {
        let turns = three_turns();
        let mock = Arc::new(MockGateway::script(progressive_replies(&turns)));
        let ctx = ctx_with(mock.clone());
        let options = AnnotateOptions::default();
        let schema = study_schema();
        let controller = StrategyController::new(&schema, &ctx, &options);

        let report = controller
            .fill("int-02", &turns, FillStrategy::Progressive)
            .await
            .unwrap();

        assert!(report.outcome.is_complete());
        // 5 interview tasks + 3 turn tasks.
        assert_eq!(mock.call_count(), 8);
        let requests = mock.take_requests();
        assert!(requests[0].user.contains("interview:summary"));
        assert!(requests[7].user.contains("turn:3"));
        // The shared context is byte-identical across calls.
        assert!(requests.windows(2).all(|w| w[0].system == w[1].system));
    }

    #[tokio::test]
    async fn test_invalid_enum_corrected_then_completes() {
        let mut bad_tree = full_tree();
        bad_tree["overall_sentiment"] = json!("ecstatic");
        let mock = Arc::new(MockGateway::script(vec![
            MockReply::content(bad_tree.to_string()),
            MockReply::content(json!({"overall_sentiment": "positive"}).to_string()),
        ]));
        let ctx = ctx_with(mock.clone());
        let options = AnnotateOptions::default();
        let schema = study_schema();
        let controller = StrategyController::new(&schema, &ctx, &options);

        let report = controller
            .fill("int-03", &three_turns(), FillStrategy::Monolithic)
            .await
            .unwrap();

        assert!(report.outcome.is_complete());
        assert_eq!(report.correction_count, 1);
        assert_eq!(report.uncertain_slots, vec!["overall_sentiment".to_string()]);

        // The correction prompt named the failing path verbatim.
        let requests = mock.take_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].user.contains("`overall_sentiment`"));
    }

    #[tokio::test]
    async fn test_correction_budget_exhaustion_degrades_to_partial() {
        let mut bad_tree = full_tree();
        bad_tree["confidence"] = json!(9.0);
        // Every correction keeps sending the same out-of-range value.
        let mock = Arc::new(MockGateway::script(vec![
            MockReply::content(bad_tree.to_string()),
            MockReply::content(json!({"confidence": 9.0}).to_string()),
        ]));
        let ctx = ctx_with(mock.clone());
        let options = AnnotateOptions::default();
        let schema = study_schema();
        let controller = StrategyController::new(&schema, &ctx, &options);

        let report = controller
            .fill("int-04", &three_turns(), FillStrategy::Monolithic)
            .await
            .unwrap();

        match report.outcome {
            AnnotationOutcome::Partial(ref p) => {
                assert_eq!(p.errors.len(), 1);
                assert_eq!(p.errors[0].slot_path, "confidence");
                assert!(p.coverage < 1.0);
            }
            _ => panic!("expected partial result"),
        }
        assert_eq!(report.correction_count, options.max_corrections);
        // 1 fill + max_corrections corrective calls, never more.
        assert_eq!(mock.call_count() as u32, 1 + options.max_corrections);
    }

    #[tokio::test]
    async fn test_malformed_output_treated_as_violation_and_corrected() {
        let mock = Arc::new(MockGateway::script(vec![
            MockReply::content("I am sorry, I cannot produce JSON today."),
            MockReply::content(full_tree().to_string()),
        ]));
        let ctx = ctx_with(mock.clone());
        let options = AnnotateOptions::default();
        let schema = study_schema();
        let controller = StrategyController::new(&schema, &ctx, &options);

        let report = controller
            .fill("int-05", &three_turns(), FillStrategy::Monolithic)
            .await
            .unwrap();

        assert!(report.outcome.is_complete());
        assert_eq!(report.correction_count, 1);
    }

    #[tokio::test]
    async fn test_structured_output_short_circuits_corrector() {
        let mut bad_tree = full_tree();
        bad_tree["overall_sentiment"] = json!("ecstatic");
        let mock = Arc::new(
            MockGateway::fixed(bad_tree.to_string())
                .with_capability(OutputCapability::StructuredOutput),
        );
        let ctx = ctx_with(mock.clone());
        let options = AnnotateOptions::default();
        let schema = study_schema();
        let controller = StrategyController::new(&schema, &ctx, &options);

        let report = controller
            .fill("int-06", &three_turns(), FillStrategy::Monolithic)
            .await
            .unwrap();

        // No corrective calls: residual errors degrade straight to partial.
        assert_eq!(mock.call_count(), 1);
        assert_eq!(report.correction_count, 0);
        assert!(!report.outcome.is_complete());
    }

    #[tokio::test]
    async fn test_provider_failure_is_wrapped_with_stage() {
        let mock = Arc::new(MockGateway::script(vec![MockReply::fail(
            ProviderError::Auth("bad key".into()),
        )]));
        let ctx = ctx_with(mock);
        let options = AnnotateOptions::default();
        let schema = study_schema();
        let controller = StrategyController::new(&schema, &ctx, &options);

        let err = controller
            .fill("int-07", &three_turns(), FillStrategy::Monolithic)
            .await
            .unwrap_err();

        match err {
            AnnotateError::RunFailed {
                interview_id,
                stage,
                ..
            } => {
                assert_eq!(interview_id, "int-07");
                assert_eq!(stage, RunStage::Filling);
            }
            other => panic!("expected RunFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_coverage_progressive_not_below_monolithic() {
        let turns = many_turns(100);

        // Monolithic response truncates after the interview slots and the
        // first ten turns.
        let mut doc = SkeletonBuilder::build(&study_schema(), &turns);
        for (path, value) in complete_fill_for(&turns) {
            let in_scope = !path.starts_with("turns[")
                || (1..=10).any(|i| path.starts_with(&format!("turns[{}].", i)));
            if in_scope {
                doc.set_value(&path, value);
            }
        }
        let truncated = doc.to_value();

        let options = AnnotateOptions {
            max_corrections: 0,
            ..AnnotateOptions::default()
        };
        let schema = study_schema();

        let mono_mock = Arc::new(MockGateway::fixed(truncated.to_string()));
        let mono_ctx = ctx_with(mono_mock);
        let mono = StrategyController::new(&schema, &mono_ctx, &options)
            .fill("int-big", &turns, FillStrategy::Monolithic)
            .await
            .unwrap();

        let prog_mock = Arc::new(MockGateway::script(progressive_replies(&turns)));
        let prog_ctx = ctx_with(prog_mock);
        let prog = StrategyController::new(&schema, &prog_ctx, &options)
            .fill("int-big", &turns, FillStrategy::Progressive)
            .await
            .unwrap();

        let mono_coverage = mono.outcome.coverage();
        let prog_coverage = prog.outcome.coverage();
        assert!(mono_coverage < 1.0);
        assert!(
            prog_coverage >= mono_coverage,
            "progressive {} < monolithic {}",
            prog_coverage,
            mono_coverage
        );
    }

    #[test]
    fn test_enumerate_tasks_order_and_paths() {
        let tasks = enumerate_tasks(&study_schema(), &three_turns());
        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "interview:summary",
                "interview:overall_sentiment",
                "interview:confidence",
                "interview:priorities",
                "interview:context",
                "turn:1",
                "turn:2",
                "turn:3",
            ]
        );
        // Struct leaves travel together in their slot's task.
        assert_eq!(
            tasks[4].paths,
            vec!["context.setting".to_string(), "context.rapport".to_string()]
        );
    }

    #[test]
    fn test_completed_serialize_with_metadata() {
        let mut doc = SkeletonBuilder::build(&study_schema(), &three_turns());
        for (path, value) in complete_fill() {
            doc.set_value(&path, value);
        }
        let completed = CompletedAnnotation {
            interview_id: "int-10".into(),
            document: doc,
        };
        let meta = ProcessingMetadata {
            provider: "mock".into(),
            model: "test".into(),
            attempt_count: 1,
            correction_count: 0,
            elapsed_ms: 12,
            token_usage: TokenUsage::new(100, 20),
            estimated_cost: 0.0,
            overall_confidence: 1.0,
            uncertain_slots: vec![],
        };
        let persisted = completed.serialize_with(&meta);
        assert_eq!(persisted["interview_id"], "int-10");
        assert_eq!(persisted["schema"], "relocation-study");
        assert_eq!(persisted["annotation"]["overall_sentiment"], "positive");
        assert_eq!(persisted["metadata"]["attempt_count"], 1);
    }
}
