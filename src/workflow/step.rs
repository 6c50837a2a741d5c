use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a step in the step universe
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased, trimmed, with spaces and dashes folded to underscores
    pub fn normalized(raw: &str) -> Self {
        let id: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        Self(id)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn default_true() -> bool {
    true
}

pub const REPORT_PLACEHOLDER: &str = "{report}";
pub const ANALYSES_PLACEHOLDER: &str = "{analyses}";

/// A triage or expert step: title plus a prompt template over the case report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub title: String,
    pub prompt: String,
    #[serde(default = "default_true")]
    pub consumes_images: bool,
}

impl StepDefinition {
    pub fn render(&self, report: &str) -> String {
        self.prompt.replace(REPORT_PLACEHOLDER, report)
    }
}

/// The aggregation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisDefinition {
    pub title: String,
    /// Prepended to the generated report
    #[serde(default)]
    pub heading: Option<String>,
    pub prompt: String,
    #[serde(default = "default_true")]
    pub consumes_images: bool,
}

impl SynthesisDefinition {
    pub fn render(&self, analyses: &str) -> String {
        self.prompt.replace(ANALYSES_PLACEHOLDER, analyses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized() {
        assert_eq!(StepId::normalized(" Pain Management "), StepId::new("pain_management"));
        assert_eq!(StepId::normalized("ENT"), StepId::new("ent"));
        assert_eq!(
            StepId::normalized("radiation-oncologist"),
            StepId::new("radiation_oncologist")
        );
    }

    #[test]
    fn test_render_substitutes_every_placeholder() {
        let step = StepDefinition {
            id: StepId::new("cardiologist"),
            title: "Cardiologist".to_string(),
            prompt: "Case: {report}\nAgain: {report}".to_string(),
            consumes_images: true,
        };
        assert_eq!(step.render("chest pain"), "Case: chest pain\nAgain: chest pain");
    }

    #[test]
    fn test_consumes_images_defaults_to_true() {
        let step: StepDefinition =
            serde_yaml::from_str("id: dentist\ntitle: Dentist\nprompt: \"{report}\"").unwrap();
        assert!(step.consumes_images);
    }

    #[test]
    fn test_step_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&StepId::new("ent")).unwrap();
        assert_eq!(json, "\"ent\"");
    }
}
