//! Event system for annotation-run lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe a run. The annotator
//! emits events when a run starts, provider calls go out, transport retries
//! fire, validation fails, and corrections are attempted. Users can implement
//! [`EventHandler`] to receive these for logging or progress tracking.

use std::sync::Arc;

/// Events emitted during an annotation run.
#[derive(Debug, Clone)]
pub enum Event {
    /// An annotation run has started.
    RunStart {
        /// Id of the interview being annotated.
        interview_id: String,
        /// Fill strategy name (`"monolithic"` or `"progressive"`).
        strategy: &'static str,
    },
    /// Segmentation produced zero turns. Non-fatal; the run continues
    /// with an empty turn set.
    SegmentationEmpty {
        /// Id of the interview.
        interview_id: String,
    },
    /// A provider call is about to go out.
    CallStart {
        /// Fill-task or correction label for this call.
        task: String,
    },
    /// A provider call returned.
    CallEnd {
        /// Fill-task or correction label for this call.
        task: String,
        /// Whether the call succeeded.
        ok: bool,
    },
    /// A transport-level retry due to a transient provider error.
    TransportRetry {
        /// Fill-task or correction label for the call being retried.
        task: String,
        /// The attempt number about to run (1-indexed).
        attempt: u32,
        /// Delay slept before this attempt in milliseconds.
        delay_ms: u64,
        /// The transient error that triggered the retry.
        reason: String,
    },
    /// Validation of the filled document found errors.
    ValidationFailed {
        /// Number of violations found.
        error_count: usize,
    },
    /// A corrective call is starting.
    CorrectionStart {
        /// The correction attempt number (1-indexed).
        attempt: u32,
        /// Violations being corrected.
        error_count: usize,
    },
    /// An annotation run has finished.
    RunEnd {
        /// Id of the interview.
        interview_id: String,
        /// Fraction of required slots holding a valid value.
        coverage: f64,
        /// Whether the run produced a complete annotation.
        completed: bool,
    },
    /// One interview in a batch finished (in any terminal state).
    BatchItemDone {
        /// Id of the interview.
        interview_id: String,
        /// `false` if the interview failed fatally.
        ok: bool,
    },
}

/// Handler for annotation-run lifecycle events.
///
/// Entirely optional -- runs work without an event handler.
///
/// # Example
///
/// ```
/// use transcript_annotator::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         if let Event::TransportRetry { attempt, reason, .. } = event {
///             eprintln!("retry {}: {}", attempt, reason);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the run emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use transcript_annotator::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::RunEnd { coverage, .. } = event {
///         println!("coverage: {:.0}%", coverage * 100.0);
///     }
/// }));
/// ```
pub struct FnEventHandler<F>(pub F);

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(Event) + Send + Sync,
{
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_without_handler_is_noop() {
        emit(
            &None,
            Event::ValidationFailed { error_count: 2 },
        );
    }

    #[test]
    fn test_fn_handler_receives_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let handler: Arc<dyn EventHandler> = Arc::new(FnEventHandler(move |_event: Event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        }));
        let handler = Some(handler);
        emit(&handler, Event::ValidationFailed { error_count: 1 });
        emit(
            &handler,
            Event::RunEnd {
                interview_id: "x".into(),
                coverage: 1.0,
                completed: true,
            },
        );
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
