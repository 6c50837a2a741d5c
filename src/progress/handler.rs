//! Progress handler trait and events

use crate::workflow::{ExtractionDegraded, StepId, StepOutcome};
use std::time::Duration;

/// Events emitted while a run progresses
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    RunStarted { has_images: bool, report_chars: usize },

    /// A triage or expert step started generating
    StepStarted { step_id: StepId, title: String },

    /// A step received a fragment; `text` is everything accumulated so far
    StepOutput {
        step_id: StepId,
        delta: String,
        text: String,
    },

    /// A step finished, successfully or not
    StepCompleted {
        step_id: StepId,
        title: String,
        outcome: StepOutcome,
        duration: Duration,
    },

    /// Triage output was turned into the required set
    RequirementsResolved {
        required: Vec<StepId>,
        dropped: Vec<String>,
        degraded: Option<ExtractionDegraded>,
    },

    /// Aggregation started over the collected results
    AggregateStarted { results: usize },

    /// The aggregator received a fragment
    AggregateOutput { delta: String, text: String },

    /// Run finished
    Completed {
        steps: usize,
        total_time: Duration,
        has_report: bool,
    },

    /// Run was cancelled
    Cancelled { completed_steps: usize, aggregating: bool },
}

/// Receives progress events; implementations must be cheap and non-blocking
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
