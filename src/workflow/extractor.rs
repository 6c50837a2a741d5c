//! Requirement extraction from triage output
//!
//! A [`RequirementStrategy`] proposes candidate step ids from the triage text.
//! [`resolve_requirements`] turns those candidates into a [`RequiredSet`]:
//! unknown ids are dropped, the imaging rule is applied, and strategy failures
//! degrade to an empty set instead of failing the run.

use super::error::{ExtractionDegraded, WorkflowError};
use super::registry::StepRegistry;
use super::required::RequiredSet;
use super::step::StepId;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no structured requirements found in triage output")]
    NotFound,

    #[error("malformed structured requirements: {0}")]
    Malformed(String),
}

pub struct ExtractionContext<'a> {
    pub registry: &'a StepRegistry,
    pub has_images: bool,
}

/// Raw strategy output, before universe filtering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub candidates: Vec<String>,
    pub degraded: Option<ExtractionDegraded>,
}

pub trait RequirementStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn extract(
        &self,
        text: &str,
        context: &ExtractionContext<'_>,
    ) -> Result<Extraction, ExtractionError>;
}

/// Whole-word, case-insensitive matching of each step's synonym phrases
/// against the requirements section of the triage text.
pub struct SynonymExtractor {
    marker: String,
    delimiter: String,
    patterns: Vec<(StepId, Vec<Regex>)>,
}

impl SynonymExtractor {
    pub fn new(registry: &StepRegistry) -> Result<Self, WorkflowError> {
        let mut patterns = Vec::new();
        for step in registry.steps() {
            // The step id itself always matches, as triage prompts list ids verbatim
            let mut phrases = vec![step.id.as_str().to_string()];
            for synonym in registry.synonyms_for(&step.id) {
                if !phrases.iter().any(|p| p.eq_ignore_ascii_case(synonym.trim())) {
                    phrases.push(synonym.trim().to_string());
                }
            }
            let compiled = phrases
                .iter()
                .map(|phrase| {
                    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase.trim()))).map_err(
                        |e| {
                            WorkflowError::InvalidUniverse(format!(
                                "synonym '{}' for step '{}': {}",
                                phrase, step.id, e
                            ))
                        },
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            patterns.push((step.id.clone(), compiled));
        }

        Ok(Self {
            marker: registry.extraction().marker.to_lowercase(),
            delimiter: registry.extraction().delimiter.to_lowercase(),
            patterns,
        })
    }

    /// Text from the marker up to the next delimiter, or `None` without a marker
    fn requirements_section<'t>(&self, lowered: &'t str) -> Option<&'t str> {
        let start = lowered.find(&self.marker)?;
        let body_start = start + self.marker.len();
        let end = if self.delimiter.is_empty() {
            None
        } else {
            lowered[body_start..]
                .find(&self.delimiter)
                .map(|offset| body_start + offset)
        };
        Some(&lowered[start..end.unwrap_or(lowered.len())])
    }
}

impl RequirementStrategy for SynonymExtractor {
    fn name(&self) -> &str {
        "synonym"
    }

    fn extract(
        &self,
        text: &str,
        _context: &ExtractionContext<'_>,
    ) -> Result<Extraction, ExtractionError> {
        let lowered = text.to_lowercase();
        let (section, degraded) = match self.requirements_section(&lowered) {
            Some(section) => (section, None),
            None => (lowered.as_str(), Some(ExtractionDegraded::MarkerMissing)),
        };

        let candidates = self
            .patterns
            .iter()
            .filter(|(_, regexes)| regexes.iter().any(|re| re.is_match(section)))
            .map(|(id, _)| id.to_string())
            .collect();

        Ok(Extraction {
            candidates,
            degraded,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StructuredRequirements {
    required_steps: Vec<String>,
}

/// Reads `{"required_steps": [...]}` from the triage output, either from a
/// fenced code block or from the outermost braces.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredExtractor;

impl StructuredExtractor {
    fn json_candidate(text: &str) -> Option<&str> {
        if let Some(fence) = text.find("```") {
            let after = &text[fence + 3..];
            let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
            let body = &after[body_start..];
            if let Some(close) = body.find("```") {
                return Some(body[..close].trim());
            }
        }

        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (end > start).then(|| &text[start..=end])
    }
}

impl RequirementStrategy for StructuredExtractor {
    fn name(&self) -> &str {
        "structured"
    }

    fn extract(
        &self,
        text: &str,
        _context: &ExtractionContext<'_>,
    ) -> Result<Extraction, ExtractionError> {
        let json = Self::json_candidate(text).ok_or(ExtractionError::NotFound)?;
        let parsed: StructuredRequirements =
            serde_json::from_str(json).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        Ok(Extraction {
            candidates: parsed.required_steps,
            degraded: None,
        })
    }
}

/// Outcome of requirement resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub required: RequiredSet,
    pub degraded: Option<ExtractionDegraded>,
    /// Candidates that named no step in the universe
    pub dropped: Vec<String>,
}

/// Runs `strategy` over the triage text. Never fails.
pub fn resolve_requirements(
    strategy: &dyn RequirementStrategy,
    text: &str,
    context: &ExtractionContext<'_>,
) -> Resolution {
    let registry = context.registry;
    let mut resolution = Resolution::default();

    match strategy.extract(text, context) {
        Ok(extraction) => {
            resolution.degraded = extraction.degraded;
            for candidate in extraction.candidates {
                let id = StepId::normalized(&candidate);
                if registry.contains(&id) {
                    // contains() was checked, insert cannot fail
                    let _ = resolution.required.insert(registry, &id);
                } else {
                    warn!(
                        strategy = strategy.name(),
                        candidate = %candidate,
                        "Dropping requirement outside the step universe"
                    );
                    resolution.dropped.push(candidate);
                }
            }
        }
        Err(e) => {
            warn!(strategy = strategy.name(), error = %e, "Requirement extraction failed");
            resolution.degraded = Some(ExtractionDegraded::StrategyFailed {
                reason: e.to_string(),
            });
        }
    }

    if context.has_images {
        let _ = resolution.required.insert(registry, registry.imaging_step());
    }

    if let Some(degraded) = &resolution.degraded {
        warn!(strategy = strategy.name(), "{}", degraded);
    }
    debug!(
        strategy = strategy.name(),
        required = ?resolution.required.to_vec(),
        dropped = resolution.dropped.len(),
        "Resolved requirements"
    );

    resolution
}
