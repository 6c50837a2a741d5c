//! Step universe: the closed set of steps a run may dispatch
//!
//! Loaded from YAML and validated before any run starts. Universe order is
//! the canonical dispatch order.

use super::error::WorkflowError;
use super::step::{
    StepDefinition, StepId, SynthesisDefinition, ANALYSES_PLACEHOLDER, REPORT_PLACEHOLDER,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

const BUILTIN_UNIVERSE: &str = include_str!("../../resources/step_universe.yaml");

pub const SUPPORTED_VERSION: u32 = 1;

fn default_delimiter() -> String {
    "\n---".to_string()
}

/// Where the extractor looks for requirements in triage output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    pub marker: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

#[derive(Debug, Deserialize)]
struct UniverseFile {
    version: u32,
    extraction: ExtractionSettings,
    imaging_step: StepId,
    triage: StepDefinition,
    synthesis: SynthesisDefinition,
    steps: Vec<StepDefinition>,
    #[serde(default)]
    synonyms: BTreeMap<StepId, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct StepRegistry {
    version: u32,
    extraction: ExtractionSettings,
    imaging_step: StepId,
    triage: StepDefinition,
    synthesis: SynthesisDefinition,
    steps: Vec<StepDefinition>,
    index: HashMap<StepId, usize>,
    synonyms: BTreeMap<StepId, Vec<String>>,
}

impl StepRegistry {
    /// The universe compiled into the binary
    pub fn builtin() -> Result<Self, WorkflowError> {
        Self::from_yaml_str(BUILTIN_UNIVERSE)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, WorkflowError> {
        let file: UniverseFile = serde_yaml::from_str(yaml)
            .map_err(|e| WorkflowError::InvalidUniverse(format!("malformed YAML: {}", e)))?;
        Self::from_parts(file)
    }

    pub fn from_file(path: &Path) -> Result<Self, WorkflowError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| WorkflowError::UniverseLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let registry = Self::from_yaml_str(&content)?;
        debug!(
            path = %path.display(),
            steps = registry.steps.len(),
            "Loaded step universe"
        );
        Ok(registry)
    }

    fn from_parts(file: UniverseFile) -> Result<Self, WorkflowError> {
        let index = file
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.id.clone(), i))
            .collect();

        let registry = Self {
            version: file.version,
            extraction: file.extraction,
            imaging_step: file.imaging_step,
            triage: file.triage,
            synthesis: file.synthesis,
            steps: file.steps,
            index,
            synonyms: file.synonyms,
        };
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        let invalid = |msg: String| Err(WorkflowError::InvalidUniverse(msg));

        if self.version != SUPPORTED_VERSION {
            return invalid(format!(
                "unsupported version {} (expected {})",
                self.version, SUPPORTED_VERSION
            ));
        }
        if self.extraction.marker.trim().is_empty() {
            return invalid("extraction marker must not be empty".to_string());
        }
        if self.triage.id.as_str().is_empty() {
            return invalid("triage step id must not be empty".to_string());
        }
        if !self.triage.prompt.contains(REPORT_PLACEHOLDER) {
            return invalid(format!(
                "triage prompt must contain {}",
                REPORT_PLACEHOLDER
            ));
        }
        if !self.synthesis.prompt.contains(ANALYSES_PLACEHOLDER) {
            return invalid(format!(
                "synthesis prompt must contain {}",
                ANALYSES_PLACEHOLDER
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.as_str().is_empty() {
                return invalid("step id must not be empty".to_string());
            }
            if step.id == self.triage.id {
                return invalid(format!(
                    "step '{}' clashes with the triage step id",
                    step.id
                ));
            }
            if !seen.insert(&step.id) {
                return invalid(format!("duplicate step id '{}'", step.id));
            }
            if !step.prompt.contains(REPORT_PLACEHOLDER) {
                return invalid(format!(
                    "prompt of step '{}' must contain {}",
                    step.id, REPORT_PLACEHOLDER
                ));
            }
        }

        if !self.index.contains_key(&self.imaging_step) {
            return invalid(format!(
                "imaging step '{}' is not in the step universe",
                self.imaging_step
            ));
        }

        for (id, phrases) in &self.synonyms {
            if !self.index.contains_key(id) {
                return invalid(format!("synonyms reference unknown step '{}'", id));
            }
            if phrases.iter().any(|p| p.trim().is_empty()) {
                return invalid(format!("empty synonym phrase for step '{}'", id));
            }
        }

        Ok(())
    }

    /// Expert step definition; the triage step is not part of the universe
    pub fn lookup(&self, id: &StepId) -> Result<&StepDefinition, WorkflowError> {
        self.index
            .get(id)
            .map(|&i| &self.steps[i])
            .ok_or_else(|| WorkflowError::UnknownStep(id.clone()))
    }

    /// Triage or expert step definition
    pub fn definition(&self, id: &StepId) -> Result<&StepDefinition, WorkflowError> {
        if *id == self.triage.id {
            Ok(&self.triage)
        } else {
            self.lookup(id)
        }
    }

    /// Position in canonical dispatch order
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.index.contains_key(id)
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn triage(&self) -> &StepDefinition {
        &self.triage
    }

    pub fn synthesis(&self) -> &SynthesisDefinition {
        &self.synthesis
    }

    pub fn imaging_step(&self) -> &StepId {
        &self.imaging_step
    }

    pub fn extraction(&self) -> &ExtractionSettings {
        &self.extraction
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Synonym phrases registered for a step, empty when it has none
    pub fn synonyms_for(&self, id: &StepId) -> &[String] {
        self.synonyms.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}
