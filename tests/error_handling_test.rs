//! Error handling integration tests
//!
//! Covers backend failures surfacing inside a run, idle timeouts,
//! configuration errors and step universe errors.

use async_trait::async_trait;
use consilium::config::{ConfigError, ConsiliumConfig, Provider};
use consilium::llm::{
    from_fragments, with_idle_timeout, BackendError, LLMClient, LLMRequest, MockLLMClient,
    MockResponse, TextStream,
};
use consilium::workflow::{Case, StepId, StepOutcome, StepRegistry, WorkflowEngine, WorkflowError};
use futures_util::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Answers triage normally, then stalls every later call after one fragment
struct StallingClient {
    idle: Duration,
}

#[async_trait]
impl LLMClient for StallingClient {
    async fn stream_generate(&self, request: LLMRequest) -> Result<TextStream, BackendError> {
        let prompt = request.flattened_prompt();
        if prompt.contains("General Practitioner (GP)") {
            return Ok(from_fragments(vec![Ok(
                "REQUIRED SPECIALISTS: nephrologist".to_string()
            )]));
        }
        if prompt.contains("highly skilled medical analyst") {
            return Ok(from_fragments(vec![Ok("Report.".to_string())]));
        }

        let stalled = stream::iter(vec![Ok("Creatinine ".to_string())])
            .chain(stream::pending())
            .boxed();
        Ok(with_idle_timeout(stalled, self.idle))
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

#[tokio::test]
async fn test_idle_timeout_becomes_transport_failure() {
    let registry = Arc::new(StepRegistry::builtin().unwrap());
    let client = Arc::new(StallingClient {
        idle: Duration::from_millis(50),
    });
    let engine = WorkflowEngine::new(client, registry).unwrap();

    let state = engine
        .run(Case::new("Swollen ankles"), &CancellationToken::new())
        .await
        .unwrap();

    let nephro = state.result_for(&StepId::new("nephrologist")).unwrap();
    assert!(nephro.text.starts_with("Creatinine \n\n[Error: API request failed."));
    assert!(matches!(nephro.outcome, StepOutcome::TransportFailure { .. }));
    assert_eq!(state.final_report(), Some("### FINAL ASSESSMENT REPORT (Summary)\n\nReport."));
}

#[tokio::test]
async fn test_failing_aggregation_keeps_partial_report() {
    let client = Arc::new(MockLLMClient::new());
    client.add_responses([
        MockResponse::text("REQUIRED SPECIALISTS: none"),
        MockResponse::fail_after(
            ["Half a summ"],
            BackendError::RateLimitError {
                retry_after: Some(30),
            },
        ),
    ]);
    let registry = Arc::new(StepRegistry::builtin().unwrap());
    let engine = WorkflowEngine::new(client, registry).unwrap();

    let state = engine
        .run(Case::new("Fatigue"), &CancellationToken::new())
        .await
        .unwrap();

    let report = state.final_report().unwrap();
    assert!(report.contains("Half a summ\n\n[Error: API request failed."));
    assert!(!state.is_cancelled());
}

#[tokio::test]
async fn test_exhausted_backend_never_aborts_the_run() {
    let client = Arc::new(MockLLMClient::new());
    client.add_response(MockResponse::text("REQUIRED SPECIALISTS: hepatologist, dietician"));
    let registry = Arc::new(StepRegistry::builtin().unwrap());
    let engine = WorkflowEngine::new(client, registry).unwrap();

    let state = engine
        .run(Case::new("Jaundice"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.results().len(), 3);
    assert!(state
        .results()
        .iter()
        .skip(1)
        .all(|r| matches!(r.outcome, StepOutcome::TransportFailure { .. })));
    assert!(state.final_report().is_some());
}

#[test]
fn test_invalid_provider_error() {
    let err = Provider::parse("watson").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidProvider(ref name) if name == "watson"));
    assert!(err.to_string().contains("Valid options"));
}

#[test]
fn test_missing_steps_file_error() {
    let config = ConsiliumConfig {
        provider: Provider::Http,
        model: "remote".to_string(),
        api_url: Some("http://localhost:8000".to_string()),
        api_token: None,
        request_timeout_secs: 10,
        steps_file: Some(PathBuf::from("/nonexistent/steps.yaml")),
        log_level: "info".to_string(),
        aggregate_on_cancel: false,
    };

    match config.load_registry() {
        Err(ConfigError::StepUniverse(WorkflowError::UniverseLoad { path, .. })) => {
            assert_eq!(path, PathBuf::from("/nonexistent/steps.yaml"));
        }
        other => panic!("Expected UniverseLoad error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_lookup_rejects_ids_outside_universe() {
    let registry = StepRegistry::builtin().unwrap();
    assert!(matches!(
        registry.lookup(&StepId::new("astrologer")),
        Err(WorkflowError::UnknownStep(_))
    ));
    assert!(matches!(
        registry.lookup(&StepId::new("gp")),
        Err(WorkflowError::UnknownStep(_))
    ));
}
