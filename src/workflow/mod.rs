//! Dynamic workflow orchestration
//!
//! A run starts with the triage step, extracts the set of required expert
//! steps from its output, dispatches them one at a time in canonical order,
//! and finishes with an aggregation step over every recorded result.

pub mod accumulator;
pub mod aggregator;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod registry;
pub mod required;
pub mod router;
pub mod state;
pub mod step;

pub use accumulator::{failure_marker, generate, DrainStatus, Drained, StreamAccumulator};
pub use aggregator::{combined_analyses, Aggregator};
pub use engine::{EngineConfig, WorkflowEngine};
pub use error::{ExtractionDegraded, WorkflowError};
pub use extractor::{
    resolve_requirements, Extraction, ExtractionContext, ExtractionError, RequirementStrategy,
    Resolution, StructuredExtractor, SynonymExtractor,
};
pub use registry::{ExtractionSettings, StepRegistry};
pub use required::RequiredSet;
pub use router::{next_step, Route};
pub use state::{Case, Phase, RunRecord, StepOutcome, StepResult, WorkflowState};
pub use step::{StepDefinition, StepId, SynthesisDefinition};
