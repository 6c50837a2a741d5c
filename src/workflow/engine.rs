use super::accumulator::{generate, DrainStatus, Drained};
use super::aggregator::Aggregator;
use super::error::WorkflowError;
use super::extractor::{
    resolve_requirements, ExtractionContext, RequirementStrategy, SynonymExtractor,
};
use super::registry::StepRegistry;
use super::required::RequiredSet;
use super::router::{next_step, Route};
use super::state::{Case, Phase, StepOutcome, StepResult, WorkflowState};
use super::step::StepDefinition;
use crate::llm::{LLMClient, LLMRequest};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Run the aggregator over partial results when a run is cancelled
    pub aggregate_on_cancel: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aggregate_on_cancel(mut self, aggregate_on_cancel: bool) -> Self {
        self.aggregate_on_cancel = aggregate_on_cancel;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Runs one case through triage, the required expert steps and aggregation.
///
/// Steps run sequentially in canonical universe order. Generation failures are
/// recorded inline and never abort a run; only configuration-integrity errors
/// surface as `Err`.
pub struct WorkflowEngine {
    client: Arc<dyn LLMClient>,
    registry: Arc<StepRegistry>,
    strategy: Arc<dyn RequirementStrategy>,
    progress: Arc<dyn ProgressHandler>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Engine with synonym-based extraction and no progress reporting
    pub fn new(
        client: Arc<dyn LLMClient>,
        registry: Arc<StepRegistry>,
    ) -> Result<Self, WorkflowError> {
        let strategy = Arc::new(SynonymExtractor::new(&registry)?);
        Ok(Self {
            client,
            registry,
            strategy,
            progress: Arc::new(NoOpHandler),
            config: EngineConfig::default(),
        })
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn RequirementStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_progress_handler(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub async fn run(
        &self,
        case: Case,
        cancel: &CancellationToken,
    ) -> Result<WorkflowState, WorkflowError> {
        let start = Instant::now();
        info!(
            backend = self.client.name(),
            strategy = self.strategy.name(),
            images = case.attachments().len(),
            "Starting workflow run"
        );
        self.progress.on_progress(&ProgressEvent::RunStarted {
            has_images: case.has_images(),
            report_chars: case.report().chars().count(),
        });

        let mut state = WorkflowState::new(case);

        loop {
            match state.phase() {
                Phase::Triage => self.triage(&mut state, cancel).await?,
                Phase::Dispatch => self.dispatch(&mut state, cancel).await?,
                Phase::Aggregate => {
                    let token = if state.is_cancelled() {
                        // the run token already fired; aggregation was explicitly requested
                        CancellationToken::new()
                    } else {
                        cancel.clone()
                    };
                    self.aggregate(&mut state, &token).await;
                    state.set_phase(Phase::Done);
                }
                Phase::Done => break,
            }
        }

        info!(
            steps = state.results().len(),
            cancelled = state.is_cancelled(),
            elapsed_ms = start.elapsed().as_millis(),
            "Workflow run finished"
        );
        self.progress.on_progress(&ProgressEvent::Completed {
            steps: state.results().len(),
            total_time: start.elapsed(),
            has_report: state.final_report().is_some(),
        });

        Ok(state)
    }

    async fn triage(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        if cancel.is_cancelled() {
            self.cancel_run(state);
            return Ok(());
        }

        let triage = self.registry.triage();
        let result = self.execute_step(triage, state.case(), cancel).await;
        let outcome = result.outcome.clone();
        let text = result.text.clone();
        state.record(result)?;

        match outcome {
            StepOutcome::Completed => {
                let context = ExtractionContext {
                    registry: &self.registry,
                    has_images: state.case().has_images(),
                };
                let resolution = resolve_requirements(self.strategy.as_ref(), &text, &context);
                self.progress
                    .on_progress(&ProgressEvent::RequirementsResolved {
                        required: resolution.required.to_vec(),
                        dropped: resolution.dropped,
                        degraded: resolution.degraded.clone(),
                    });
                state.set_required(resolution.required);
                state.set_degraded(resolution.degraded);
                state.set_phase(Phase::Dispatch);
            }
            StepOutcome::TransportFailure { error } => {
                warn!(error = %error, "Triage failed, aggregating triage result only");
                self.progress
                    .on_progress(&ProgressEvent::RequirementsResolved {
                        required: Vec::new(),
                        dropped: Vec::new(),
                        degraded: None,
                    });
                state.set_required(RequiredSet::new());
                state.set_phase(Phase::Aggregate);
            }
            StepOutcome::Cancelled => self.cancel_run(state),
        }

        Ok(())
    }

    async fn dispatch(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        if cancel.is_cancelled() {
            self.cancel_run(state);
            return Ok(());
        }

        match next_step(state) {
            Route::Step(id) => {
                let definition = self.registry.lookup(&id)?;
                debug!(step = %id, "Dispatching step");
                let result = self.execute_step(definition, state.case(), cancel).await;
                let cancelled = result.outcome == StepOutcome::Cancelled;
                state.record(result)?;
                if cancelled {
                    self.cancel_run(state);
                }
            }
            Route::Aggregate => {
                debug!(
                    visited = state.visited_count(),
                    required = state.required().len(),
                    "All required steps visited"
                );
                state.set_phase(Phase::Aggregate);
            }
        }

        Ok(())
    }

    fn cancel_run(&self, state: &mut WorkflowState) {
        let aggregating = self.config.aggregate_on_cancel;
        warn!(
            completed_steps = state.results().len(),
            aggregating, "Run cancelled"
        );
        state.mark_cancelled();
        self.progress.on_progress(&ProgressEvent::Cancelled {
            completed_steps: state.results().len(),
            aggregating,
        });
        state.set_phase(if aggregating {
            Phase::Aggregate
        } else {
            Phase::Done
        });
    }

    fn request_for(&self, prompt: String, case: &Case, consumes_images: bool) -> LLMRequest {
        let mut request = LLMRequest::prompt(prompt);
        if consumes_images && case.has_images() {
            request = request.with_attachments(case.attachments().to_vec());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    async fn execute_step(
        &self,
        step: &StepDefinition,
        case: &Case,
        cancel: &CancellationToken,
    ) -> StepResult {
        self.progress.on_progress(&ProgressEvent::StepStarted {
            step_id: step.id.clone(),
            title: step.title.clone(),
        });

        let request = self.request_for(step.render(case.report()), case, step.consumes_images);
        let start = Instant::now();
        let Drained { text, status } = generate(self.client.as_ref(), request, cancel, |delta, text| {
            self.progress.on_progress(&ProgressEvent::StepOutput {
                step_id: step.id.clone(),
                delta: delta.to_string(),
                text: text.to_string(),
            });
        })
        .await;
        let duration = start.elapsed();

        let outcome = match status {
            DrainStatus::Complete => StepOutcome::Completed,
            DrainStatus::TransportFailure(error) => StepOutcome::TransportFailure {
                error: error.to_string(),
            },
            DrainStatus::Cancelled => StepOutcome::Cancelled,
        };

        self.progress.on_progress(&ProgressEvent::StepCompleted {
            step_id: step.id.clone(),
            title: step.title.clone(),
            outcome: outcome.clone(),
            duration,
        });

        StepResult {
            step_id: step.id.clone(),
            title: step.title.clone(),
            text,
            outcome,
            duration_ms: duration.as_millis() as u64,
        }
    }

    async fn synthesize(&self, state: &WorkflowState, cancel: &CancellationToken) -> Drained {
        let aggregator = Aggregator::new(
            self.client.as_ref(),
            self.registry.synthesis(),
            self.progress.as_ref(),
        );
        let request = aggregator.build_request(state.results(), state.case().attachments());
        aggregator
            .synthesize(request, state.results().len(), cancel)
            .await
    }

    /// Stores the synthesized report; returns false when synthesis was cancelled
    fn store_report(state: &mut WorkflowState, drained: Drained) -> bool {
        match drained.status {
            DrainStatus::Cancelled => false,
            DrainStatus::TransportFailure(error) => {
                warn!(error = %error, "Aggregation failed, keeping partial report");
                state.set_final_report(drained.text);
                true
            }
            DrainStatus::Complete => {
                state.set_final_report(drained.text);
                true
            }
        }
    }

    async fn aggregate(&self, state: &mut WorkflowState, cancel: &CancellationToken) {
        let drained = self.synthesize(state, cancel).await;
        if !Self::store_report(state, drained) {
            warn!("Aggregation cancelled, no final report");
            if !state.is_cancelled() {
                state.mark_cancelled();
                self.progress.on_progress(&ProgressEvent::Cancelled {
                    completed_steps: state.results().len(),
                    aggregating: true,
                });
            }
        }
    }

    /// Re-runs only the aggregator over the recorded results and replaces the
    /// final report. Returns `None` if cancelled, leaving the previous report.
    pub async fn regenerate_summary(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Option<String> {
        info!(results = state.results().len(), "Regenerating summary");
        let drained = self.synthesize(state, cancel).await;
        if Self::store_report(state, drained) {
            state.final_report().map(str::to_string)
        } else {
            warn!("Summary regeneration cancelled");
            None
        }
    }
}
