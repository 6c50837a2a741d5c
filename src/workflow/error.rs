use super::step::StepId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-integrity and engine-invariant errors. None of these are
/// produced by a failing generation backend.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Unknown step '{0}'")]
    UnknownStep(StepId),

    #[error("Invalid step universe: {0}")]
    InvalidUniverse(String),

    #[error("Step '{0}' already executed in this run")]
    AlreadyVisited(StepId),

    #[error("Failed to load step universe from {path}: {reason}")]
    UniverseLoad { path: PathBuf, reason: String },
}

/// Requirement extraction fell back to a weaker result. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionDegraded {
    #[error("requirement marker not found, scanned full triage text")]
    MarkerMissing,

    #[error("requirement extraction failed: {reason}")]
    StrategyFailed { reason: String },
}
