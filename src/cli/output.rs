//! Output formatting for consultation runs
//!
//! JSON and YAML emit the serialized [`RunRecord`]; the human format lays the
//! run out as triage assessment, one section per required step, then the
//! final report.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::workflow::{RunRecord, StepOutcome, StepRegistry, WorkflowState};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

pub const PENDING_ANALYSIS: &str = "Analysis pending...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

#[derive(Debug, Serialize)]
struct SummaryOutput<'a> {
    title: &'a str,
    final_report: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StepListing<'a> {
    position: usize,
    id: &'a str,
    title: &'a str,
    consumes_images: bool,
    synonyms: &'a [String],
}

#[derive(Debug, Serialize)]
struct UniverseListing<'a> {
    version: u32,
    triage: &'a str,
    imaging_step: &'a str,
    steps: Vec<StepListing<'a>>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a finished run
    pub fn format_run(&self, state: &WorkflowState, registry: &StepRegistry) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.to_json(&state.to_record()),
            OutputFormat::Yaml => self.to_yaml(&state.to_record()),
            OutputFormat::Human => Ok(self.format_run_human(state, registry)),
        }
    }

    /// Formats a regenerated summary
    pub fn format_summary(&self, registry: &StepRegistry, report: Option<&str>) -> Result<String> {
        let title = &registry.synthesis().title;
        match self.format {
            OutputFormat::Json => self.to_json(&SummaryOutput {
                title,
                final_report: report,
            }),
            OutputFormat::Yaml => self.to_yaml(&SummaryOutput {
                title,
                final_report: report,
            }),
            OutputFormat::Human => {
                let mut output = section_header(title);
                output.push_str(report.unwrap_or("Summary not available."));
                output.push('\n');
                Ok(output)
            }
        }
    }

    /// Formats the step universe listing
    pub fn format_steps(&self, registry: &StepRegistry) -> Result<String> {
        let listing = UniverseListing {
            version: registry.version(),
            triage: registry.triage().id.as_str(),
            imaging_step: registry.imaging_step().as_str(),
            steps: registry
                .steps()
                .iter()
                .enumerate()
                .map(|(i, step)| StepListing {
                    position: i + 1,
                    id: step.id.as_str(),
                    title: &step.title,
                    consumes_images: step.consumes_images,
                    synonyms: registry.synonyms_for(&step.id),
                })
                .collect(),
        };

        match self.format {
            OutputFormat::Json => self.to_json(&listing),
            OutputFormat::Yaml => self.to_yaml(&listing),
            OutputFormat::Human => Ok(format_steps_human(&listing)),
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        serde_json::to_string_pretty(value).context("Failed to serialize output to JSON")
    }

    fn to_yaml<T: Serialize>(&self, value: &T) -> Result<String> {
        serde_yaml::to_string(value).context("Failed to serialize output to YAML")
    }

    fn format_run_human(&self, state: &WorkflowState, registry: &StepRegistry) -> String {
        let mut output = String::new();
        let triage = registry.triage();

        output.push_str(&section_header(&format!("Triage Assessment ({})", triage.title)));
        match state.result_for(&triage.id) {
            Some(result) => push_result_text(&mut output, &result.text, &result.outcome),
            None => output.push_str(PENDING_ANALYSIS),
        }
        output.push_str("\n\n");

        if let Some(degraded) = state.degraded() {
            output.push_str(&format!("\u{26A0} Requirement extraction degraded: {}\n\n", degraded));
        }

        if state.required().is_empty() {
            output.push_str("No expert steps required.\n\n");
        }

        for id in state.required().iter() {
            let title = registry
                .definition(id)
                .map(|d| d.title.as_str())
                .unwrap_or_else(|_| id.as_str());
            output.push_str(&section_header(title));
            match state.result_for(id) {
                Some(result) => push_result_text(&mut output, &result.text, &result.outcome),
                None => output.push_str(PENDING_ANALYSIS),
            }
            output.push_str("\n\n");
        }

        output.push_str(&section_header(&registry.synthesis().title));
        match state.final_report() {
            Some(report) => output.push_str(report),
            None if state.is_cancelled() => output.push_str("Run cancelled before the final report."),
            None => output.push_str("Summary not available."),
        }
        output.push('\n');

        if state.is_cancelled() {
            output.push_str("\n\u{26A0} Run was cancelled; results are partial.\n");
        }

        output
    }
}

fn section_header(title: &str) -> String {
    format!("{}\n{}\n\n", title, RULE)
}

fn push_result_text(output: &mut String, text: &str, outcome: &StepOutcome) {
    output.push_str(text);
    if *outcome == StepOutcome::Cancelled {
        output.push_str("\n(cancelled)");
    }
}

fn format_steps_human(listing: &UniverseListing<'_>) -> String {
    let mut output = section_header(&format!("Step Universe (version {})", listing.version));
    output.push_str(&format!("Triage:       {}\n", listing.triage));
    output.push_str(&format!("Imaging step: {}\n\n", listing.imaging_step));

    for step in &listing.steps {
        let images = if step.consumes_images { " [images]" } else { "" };
        output.push_str(&format!(
            "{:>2}. {} ({}){}\n",
            step.position, step.title, step.id, images
        ));
        if !step.synonyms.is_empty() {
            output.push_str(&format!("    \u{2514}\u{2500} {}\n", step.synonyms.join(", ")));
        }
    }
    output
}

/// Parses a run record saved as JSON
pub fn parse_run_record(json: &str) -> Result<RunRecord> {
    serde_json::from_str(json).context("Failed to parse run record")
}
