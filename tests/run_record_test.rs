//! Saving runs, restoring them, and regenerating summaries from disk

use consilium::cli::handlers::load_run;
use consilium::llm::{MockLLMClient, MockResponse};
use consilium::workflow::{
    Case, ExtractionDegraded, Phase, RunRecord, StepId, StepRegistry, WorkflowEngine,
    WorkflowError, WorkflowState,
};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use tokio_util::sync::CancellationToken;

const CUSTOM_UNIVERSE: &str = r#"
version: 1
extraction:
  marker: "needs:"
imaging_step: xray
triage:
  id: intake
  title: Intake
  prompt: "INTAKE {report}"
synthesis:
  title: Wrap-up
  prompt: "WRAP-UP {analyses}"
  consumes_images: false
steps:
  - id: xray
    title: X-Ray Review
    prompt: "XRAY {report}"
  - id: physio
    title: Physiotherapist
    prompt: "PHYSIO {report}"
    consumes_images: false
synonyms:
  physio: ["physio", "physiotherapy"]
  xray: ["x-ray"]
"#;

async fn finished_run(registry: Arc<StepRegistry>) -> WorkflowState {
    let client = Arc::new(MockLLMClient::new());
    client.add_responses([
        MockResponse::text("Sprain likely.\nREQUIRED SPECIALISTS: pulmonologist\n---"),
        MockResponse::text("Lungs clear."),
        MockResponse::text("Rest and review."),
    ]);
    let engine = WorkflowEngine::new(client, registry).unwrap();
    engine
        .run(Case::new("Shortness of breath"), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_saved_run_regenerates_summary() {
    let registry = Arc::new(StepRegistry::builtin().unwrap());
    let state = finished_run(registry.clone()).await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.json");
    fs::write(&path, serde_json::to_string_pretty(&state.to_record()).unwrap()).unwrap();

    let mut restored = load_run(&path, &registry).unwrap();
    assert_eq!(restored.phase(), Phase::Done);
    assert_eq!(
        restored.visited(),
        vec![StepId::new("gp"), StepId::new("pulmonologist")]
    );

    let client = Arc::new(MockLLMClient::new());
    client.add_response(MockResponse::text("Second opinion."));
    let engine = WorkflowEngine::new(client.clone(), registry).unwrap();

    let report = engine
        .regenerate_summary(&mut restored, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.ends_with("Second opinion."));
    assert_eq!(restored.final_report(), Some(report.as_str()));
    assert_eq!(restored.results(), state.results());

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Pulmonologist: Lungs clear."));
}

#[tokio::test]
async fn test_cancelled_regeneration_keeps_previous_report() {
    let registry = Arc::new(StepRegistry::builtin().unwrap());
    let mut state = finished_run(registry.clone()).await;
    let previous = state.final_report().map(str::to_string);

    let engine = WorkflowEngine::new(Arc::new(MockLLMClient::new()), registry).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(engine.regenerate_summary(&mut state, &cancel).await.is_none());
    assert_eq!(state.final_report().map(str::to_string), previous);
}

#[tokio::test]
async fn test_record_yaml_round_trip() {
    let registry = Arc::new(StepRegistry::builtin().unwrap());
    let state = finished_run(registry.clone()).await;

    let yaml = serde_yaml::to_string(&state.to_record()).unwrap();
    let record: RunRecord = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(record, state.to_record());

    let restored = WorkflowState::from_record(record, &registry).unwrap();
    assert_eq!(restored.results(), state.results());
}

#[test]
fn test_record_with_unknown_step_is_rejected() {
    let registry = StepRegistry::builtin().unwrap();
    let record: RunRecord = serde_json::from_value(serde_json::json!({
        "started_at": "2024-05-01T12:00:00Z",
        "report": "r",
        "required_steps": ["cardiologist"],
        "visited_steps": ["gp", "witch_doctor"],
        "results": [
            {"step_id": "gp", "title": "GP", "text": "t", "outcome": {"status": "completed"}, "duration_ms": 1},
            {"step_id": "witch_doctor", "title": "?", "text": "t", "outcome": {"status": "completed"}, "duration_ms": 1}
        ],
        "final_report": null
    }))
    .unwrap();

    let err = WorkflowState::from_record(record, &registry).unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownStep(id) if id.as_str() == "witch_doctor"));
}

#[test]
fn test_record_defaults_optional_fields() {
    let record: RunRecord = serde_json::from_value(serde_json::json!({
        "started_at": "2024-05-01T12:00:00Z",
        "report": "r",
        "required_steps": [],
        "visited_steps": [],
        "results": [],
        "final_report": null,
        "degraded": {"kind": "marker_missing"}
    }))
    .unwrap();

    assert!(record.attachments.is_empty());
    assert!(!record.cancelled);
    assert_eq!(record.degraded, Some(ExtractionDegraded::MarkerMissing));
}

#[tokio::test]
async fn test_custom_universe_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CUSTOM_UNIVERSE.as_bytes()).unwrap();
    let registry = Arc::new(StepRegistry::from_file(file.path()).unwrap());

    assert_eq!(registry.triage().id, StepId::new("intake"));
    assert_eq!(registry.extraction().delimiter, "\n---");

    let client = Arc::new(MockLLMClient::new());
    client.add_rule("INTAKE", MockResponse::text("needs: physiotherapy"));
    client.add_rule("XRAY", MockResponse::text("hairline fracture"));
    client.add_rule("PHYSIO", MockResponse::text("mobilise"));
    client.add_rule("WRAP-UP", MockResponse::text("done"));
    let engine = WorkflowEngine::new(client.clone(), registry).unwrap();

    let attachment = consilium::llm::Attachment::new("knee.png", "image/png", vec![1]);
    let state = engine
        .run(
            Case::with_attachments("Knee pain", vec![attachment]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        state.visited(),
        vec![StepId::new("intake"), StepId::new("xray"), StepId::new("physio")]
    );
    assert_eq!(state.final_report(), Some("done"));

    let requests = client.requests();
    assert_eq!(requests[1].attachments.len(), 1);
    assert!(requests[2].attachments.is_empty());
    assert!(requests[3].attachments.is_empty());
}

#[test]
fn test_universe_with_orphaned_synonyms_is_rejected() {
    let yaml = CUSTOM_UNIVERSE.replace("xray: [\"x-ray\"]", "ghost: [\"boo\"]");
    let err = StepRegistry::from_yaml_str(&yaml).unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidUniverse(msg) if msg.contains("ghost")));
}
