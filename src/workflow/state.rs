//! Workflow state owned by the engine for one run, and its serialized record

use super::error::{ExtractionDegraded, WorkflowError};
use super::registry::StepRegistry;
use super::required::RequiredSet;
use super::step::StepId;
use crate::llm::Attachment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Immutable input of one run
#[derive(Debug, Clone)]
pub struct Case {
    report: String,
    attachments: Vec<Attachment>,
}

impl Case {
    pub fn new(report: impl Into<String>) -> Self {
        Self {
            report: report.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(report: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            report: report.into(),
            attachments,
        }
    }

    pub fn report(&self) -> &str {
        &self.report
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn has_images(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    TransportFailure { error: String },
    Cancelled,
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub title: String,
    pub text: String,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Triage,
    Dispatch,
    Aggregate,
    Done,
}

#[derive(Debug, Clone)]
pub struct WorkflowState {
    case: Case,
    phase: Phase,
    results: Vec<StepResult>,
    required: RequiredSet,
    visited: HashSet<StepId>,
    final_report: Option<String>,
    degraded: Option<ExtractionDegraded>,
    cancelled: bool,
    started_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(case: Case) -> Self {
        Self {
            case,
            phase: Phase::Triage,
            results: Vec::new(),
            required: RequiredSet::new(),
            visited: HashSet::new(),
            final_report: None,
            degraded: None,
            cancelled: false,
            started_at: Utc::now(),
        }
    }

    pub fn case(&self) -> &Case {
        &self.case
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Step results in execution order, triage first
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn result_for(&self, id: &StepId) -> Option<&StepResult> {
        self.results.iter().find(|r| &r.step_id == id)
    }

    pub fn required(&self) -> &RequiredSet {
        &self.required
    }

    pub fn is_visited(&self, id: &StepId) -> bool {
        self.visited.contains(id)
    }

    /// Visited steps in execution order
    pub fn visited(&self) -> Vec<StepId> {
        self.results.iter().map(|r| r.step_id.clone()).collect()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn final_report(&self) -> Option<&str> {
        self.final_report.as_deref()
    }

    pub fn degraded(&self) -> Option<&ExtractionDegraded> {
        self.degraded.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Replaces the required set. Refining it mid-run is allowed; the router
    /// re-reads it before every dispatch.
    pub(crate) fn set_required(&mut self, required: RequiredSet) {
        self.required = required;
    }

    pub(crate) fn set_degraded(&mut self, degraded: Option<ExtractionDegraded>) {
        self.degraded = degraded;
    }

    pub(crate) fn set_final_report(&mut self, report: String) {
        self.final_report = Some(report);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Appends a result and marks its step visited
    pub(crate) fn record(&mut self, result: StepResult) -> Result<(), WorkflowError> {
        if !self.visited.insert(result.step_id.clone()) {
            return Err(WorkflowError::AlreadyVisited(result.step_id));
        }
        self.results.push(result);
        Ok(())
    }

    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            started_at: self.started_at,
            report: self.case.report.clone(),
            attachments: self
                .case
                .attachments
                .iter()
                .map(|a| a.name.clone())
                .collect(),
            required_steps: self.required.to_vec(),
            visited_steps: self.visited(),
            results: self.results.clone(),
            final_report: self.final_report.clone(),
            degraded: self.degraded.clone(),
            cancelled: self.cancelled,
        }
    }

    /// Rebuilds a finished state from a record. Attachment bytes are not
    /// recorded, so the restored case carries none.
    pub fn from_record(record: RunRecord, registry: &StepRegistry) -> Result<Self, WorkflowError> {
        for result in &record.results {
            registry.definition(&result.step_id)?;
        }
        let required = RequiredSet::from_ids(registry, &record.required_steps)?;

        let mut state = Self::new(Case::new(record.report));
        state.started_at = record.started_at;
        state.required = required;
        for result in record.results {
            state.record(result)?;
        }
        state.final_report = record.final_report;
        state.degraded = record.degraded;
        state.cancelled = record.cancelled;
        state.phase = Phase::Done;
        Ok(state)
    }
}

/// Serialized form of a run, used for saving and for regenerating summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub report: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub required_steps: Vec<StepId>,
    pub visited_steps: Vec<StepId>,
    pub results: Vec<StepResult>,
    pub final_report: Option<String>,
    #[serde(default)]
    pub degraded: Option<ExtractionDegraded>,
    #[serde(default)]
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, text: &str) -> StepResult {
        StepResult {
            step_id: StepId::new(id),
            title: id.to_string(),
            text: text.to_string(),
            outcome: StepOutcome::Completed,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_record_rejects_revisit() {
        let mut state = WorkflowState::new(Case::new("report"));
        state.record(result("gp", "triage")).unwrap();
        state.record(result("cardiologist", "ok")).unwrap();

        let err = state.record(result("cardiologist", "again")).unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyVisited(_)));
        assert_eq!(state.results().len(), 2);
        assert_eq!(state.visited_count(), state.results().len());
    }

    #[test]
    fn test_case_has_images() {
        assert!(!Case::new("r").has_images());
        let case = Case::with_attachments("r", vec![Attachment::new("x.png", "image/png", vec![1])]);
        assert!(case.has_images());
    }

    #[test]
    fn test_record_round_trip_through_registry() {
        let registry = StepRegistry::builtin().unwrap();
        let mut state = WorkflowState::new(Case::with_attachments(
            "cough",
            vec![Attachment::new("chest.png", "image/png", vec![1, 2])],
        ));
        state.set_required(
            RequiredSet::from_ids(&registry, &[StepId::new("radiologist")]).unwrap(),
        );
        state.record(result("gp", "triage")).unwrap();
        state.record(result("radiologist", "clear")).unwrap();
        state.set_final_report("summary".to_string());

        let record = state.to_record();
        assert_eq!(record.attachments, vec!["chest.png".to_string()]);
        assert_eq!(
            record.visited_steps,
            vec![StepId::new("gp"), StepId::new("radiologist")]
        );

        let json = serde_json::to_string(&record).unwrap();
        let restored =
            WorkflowState::from_record(serde_json::from_str(&json).unwrap(), &registry).unwrap();

        assert_eq!(restored.phase(), Phase::Done);
        assert_eq!(restored.results(), state.results());
        assert_eq!(restored.required(), state.required());
        assert_eq!(restored.final_report(), Some("summary"));
        assert!(!restored.case().has_images());
    }

    #[test]
    fn test_from_record_rejects_unknown_step() {
        let registry = StepRegistry::builtin().unwrap();
        let mut state = WorkflowState::new(Case::new("r"));
        state.record(result("astrologer", "stars")).unwrap();

        let err = WorkflowState::from_record(state.to_record(), &registry).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStep(_)));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = StepOutcome::TransportFailure {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "transport_failure");
        assert_eq!(json["error"], "boom");
    }
}
