use super::accumulator::{generate, Drained};
use super::state::StepResult;
use super::step::SynthesisDefinition;
use crate::llm::{Attachment, LLMClient, LLMRequest};
use crate::progress::{ProgressEvent, ProgressHandler};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// `"{title}: {text}"` per result, in execution order
pub fn combined_analyses(results: &[StepResult]) -> String {
    results
        .iter()
        .map(|r| format!("{}: {}", r.title, r.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Synthesizes step results into the final report. Holds no state between
/// calls, so it can be re-run on the same results any number of times.
pub struct Aggregator<'a> {
    client: &'a dyn LLMClient,
    synthesis: &'a SynthesisDefinition,
    progress: &'a dyn ProgressHandler,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        client: &'a dyn LLMClient,
        synthesis: &'a SynthesisDefinition,
        progress: &'a dyn ProgressHandler,
    ) -> Self {
        Self {
            client,
            synthesis,
            progress,
        }
    }

    pub fn build_request(&self, results: &[StepResult], attachments: &[Attachment]) -> LLMRequest {
        let prompt = self.synthesis.render(&combined_analyses(results));
        let request = LLMRequest::prompt(prompt);
        if self.synthesis.consumes_images {
            request.with_attachments(attachments.to_vec())
        } else {
            request
        }
    }

    /// Generates the report; the synthesis heading, if any, prefixes the text
    pub async fn synthesize(
        &self,
        request: LLMRequest,
        results: usize,
        cancel: &CancellationToken,
    ) -> Drained {
        self.progress
            .on_progress(&ProgressEvent::AggregateStarted { results });
        debug!(results, backend = self.client.name(), "Synthesizing report");

        let mut drained = generate(self.client, request, cancel, |delta, text| {
            self.progress.on_progress(&ProgressEvent::AggregateOutput {
                delta: delta.to_string(),
                text: text.to_string(),
            });
        })
        .await;

        if let Some(heading) = &self.synthesis.heading {
            drained.text.insert_str(0, heading);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLLMClient, MockResponse};
    use crate::progress::NoOpHandler;
    use crate::workflow::accumulator::DrainStatus;
    use crate::workflow::state::StepOutcome;
    use crate::workflow::step::StepId;

    fn result(id: &str, title: &str, text: &str) -> StepResult {
        StepResult {
            step_id: StepId::new(id),
            title: title.to_string(),
            text: text.to_string(),
            outcome: StepOutcome::Completed,
            duration_ms: 0,
        }
    }

    fn synthesis(heading: Option<&str>) -> SynthesisDefinition {
        SynthesisDefinition {
            title: "Summary".to_string(),
            heading: heading.map(str::to_string),
            prompt: "Summarize:\n{analyses}".to_string(),
            consumes_images: false,
        }
    }

    #[test]
    fn test_combined_analyses_keeps_execution_order() {
        let results = vec![
            result("gp", "General Practitioner", "triage"),
            result("dermatologist", "Dermatologist", "rash"),
            result("cardiologist", "Cardiologist", "murmur"),
        ];
        assert_eq!(
            combined_analyses(&results),
            "General Practitioner: triage\nDermatologist: rash\nCardiologist: murmur"
        );
    }

    #[test]
    fn test_attachments_follow_synthesis_definition() {
        let client = MockLLMClient::new();
        let attachments = vec![Attachment::new("x.png", "image/png", vec![1])];

        let without = synthesis(None);
        let aggregator = Aggregator::new(&client, &without, &NoOpHandler);
        assert!(aggregator.build_request(&[], &attachments).attachments.is_empty());

        let with_images = SynthesisDefinition {
            consumes_images: true,
            ..synthesis(None)
        };
        let aggregator = Aggregator::new(&client, &with_images, &NoOpHandler);
        assert_eq!(aggregator.build_request(&[], &attachments).attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_synthesize_prefixes_heading() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::fragments(["All ", "clear."]));
        let definition = synthesis(Some("## Report\n\n"));
        let aggregator = Aggregator::new(&client, &definition, &NoOpHandler);

        let results = vec![result("gp", "GP", "fine")];
        let request = aggregator.build_request(&results, &[]);
        let drained = aggregator
            .synthesize(request, results.len(), &CancellationToken::new())
            .await;

        assert_eq!(drained.text, "## Report\n\nAll clear.");
        assert_eq!(drained.status, DrainStatus::Complete);
        assert_eq!(client.prompts(), vec!["Summarize:\nGP: fine".to_string()]);
    }
}
