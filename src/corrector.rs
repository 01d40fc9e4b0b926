//! Bounded correction loop for validation failures.
//!
//! The retry loop is an explicit state machine rather than an
//! exception-catching loop, so its transitions are testable without a live
//! provider. The attempt bound is load-bearing for cost control: exceeding
//! it is terminal failure (degrading to a partial result), never an
//! unbounded loop.

use crate::prompt::{numbered_list, section};
use crate::skeleton::SkeletonDocument;
use crate::validation::ValidationError;

/// The phases of one fill-validate-correct cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Fill calls are in flight.
    Filling,
    /// The document is being validated.
    Validating,
    /// A corrective call is in flight.
    Correcting,
    /// Validation passed. Terminal.
    Succeeded,
    /// The attempt bound was exhausted with errors remaining. Terminal.
    Failed,
}

/// Drives the `{Filling, Validating, Correcting, Succeeded, Failed}` state
/// machine. Every transition is explicit; the loop reaches a terminal state
/// in at most `2 * max_attempts + 2` transitions.
#[derive(Debug)]
pub struct CorrectionLoop {
    state: LoopState,
    attempts: u32,
    max_attempts: u32,
}

impl CorrectionLoop {
    /// Start a new loop in `Filling` with the given corrective-call bound.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: LoopState::Filling,
            attempts: 0,
            max_attempts,
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Corrective calls issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the loop has reached `Succeeded` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, LoopState::Succeeded | LoopState::Failed)
    }

    /// Filling is done; move to validation.
    pub fn filled(&mut self) {
        debug_assert_eq!(self.state, LoopState::Filling);
        self.state = LoopState::Validating;
    }

    /// Record a validation outcome. With zero errors the loop succeeds;
    /// otherwise it moves to `Correcting` while attempts remain, and to
    /// `Failed` once the bound is spent.
    pub fn validated(&mut self, error_count: usize) -> LoopState {
        debug_assert_eq!(self.state, LoopState::Validating);
        self.state = if error_count == 0 {
            LoopState::Succeeded
        } else if self.attempts < self.max_attempts {
            self.attempts += 1;
            LoopState::Correcting
        } else {
            LoopState::Failed
        };
        self.state
    }

    /// The corrective call returned; re-validate.
    pub fn corrected(&mut self) {
        debug_assert_eq!(self.state, LoopState::Correcting);
        self.state = LoopState::Validating;
    }
}

/// Build the corrective follow-up prompt: every violation listed by exact
/// slot path and violated rule, asking only for corrected values at those
/// paths. The shared context (schema + transcript) rides along as the
/// system prompt, so this stays small.
pub fn correction_prompt(errors: &[ValidationError], doc: &SkeletonDocument) -> String {
    let violations: Vec<String> = errors
        .iter()
        .map(|e| {
            let current = doc
                .get(&e.slot_path)
                .and_then(|n| n.state.as_value())
                .map(|v| format!(" (current value: {})", v))
                .unwrap_or_default();
            format!(
                "`{}` — {}: {}{}",
                e.slot_path,
                e.kind.as_str(),
                e.message,
                current
            )
        })
        .collect();

    format!(
        "Your previous response left the document invalid. Fix exactly these \
         violations and nothing else:\n\n{}\n\n\
         Respond with a single JSON object mapping each listed slot path to \
         its corrected value.\n\n{}",
        numbered_list(&violations),
        section(
            "Current document",
            &serde_json::to_string_pretty(&doc.to_value()).unwrap_or_default()
        )
    )
}
