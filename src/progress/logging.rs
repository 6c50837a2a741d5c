//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use crate::workflow::StepOutcome;
use tracing::{info, trace, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted {
                has_images,
                report_chars,
            } => {
                info!(has_images, report_chars, "Starting consultation");
            }
            ProgressEvent::StepStarted { step_id, title } => {
                info!(step = %step_id, title = %title, "Starting step");
            }
            ProgressEvent::StepOutput { step_id, text, .. } => {
                trace!(step = %step_id, chars = text.len(), "Step output");
            }
            ProgressEvent::StepCompleted {
                step_id,
                outcome,
                duration,
                ..
            } => match outcome {
                StepOutcome::Completed => {
                    info!(
                        step = %step_id,
                        duration_ms = duration.as_millis(),
                        "Step complete"
                    );
                }
                StepOutcome::TransportFailure { error } => {
                    warn!(
                        step = %step_id,
                        duration_ms = duration.as_millis(),
                        error = %error,
                        "Step failed, continuing"
                    );
                }
                StepOutcome::Cancelled => {
                    warn!(step = %step_id, "Step cancelled");
                }
            },
            ProgressEvent::RequirementsResolved {
                required,
                dropped,
                degraded,
            } => {
                let required: Vec<&str> = required.iter().map(|id| id.as_str()).collect();
                info!(required = ?required, "Required steps resolved");
                if !dropped.is_empty() {
                    warn!(dropped = ?dropped, "Ignored unknown requirements");
                }
                if let Some(degraded) = degraded {
                    warn!(reason = %degraded, "Requirement extraction degraded");
                }
            }
            ProgressEvent::AggregateStarted { results } => {
                info!(results, "Aggregating step results");
            }
            ProgressEvent::AggregateOutput { text, .. } => {
                trace!(chars = text.len(), "Aggregate output");
            }
            ProgressEvent::Completed {
                steps,
                total_time,
                has_report,
            } => {
                info!(
                    steps,
                    has_report,
                    total_time_ms = total_time.as_millis(),
                    "Consultation complete"
                );
            }
            ProgressEvent::Cancelled {
                completed_steps,
                aggregating,
            } => {
                warn!(completed_steps, aggregating, "Consultation cancelled");
            }
        }
    }
}
