// ABOUTME: Integration tests for the execution writer and its on-disk bundle
// ABOUTME: Covers single-step recording, DOM truncation, crashes, telemetry and checkpoints

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;
use vrooli_core::{
    sha256_hex, ActionType, CompiledInstruction, DomSnapshot, ExecutionPlan, FailureKind,
    StepFailure, StepOutcome, DOM_SNAPSHOT_MAX_BYTES,
};
use vrooli_driver::DriverClient;
use vrooli_executions::{
    ArtifactType, ExecutionIndex, ExecutionStatus, ExecutionWriter, FilesystemArtifactStorage,
    LogLevel, SqliteExecutionIndex, StepStatus, StepTelemetry, TelemetryKind, WriterConfig,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn index() -> Arc<SqliteExecutionIndex> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let index = SqliteExecutionIndex::new(pool);
    index.init().await.unwrap();
    Arc::new(index)
}

fn read_json(path: &std::path::Path) -> JsonValue {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_single_step_execution_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/s1/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "step_outcome": {
                "stepIndex": 0,
                "stepType": "click",
                "success": true,
                "startedAt": "2024-01-01T00:00:00Z",
                "completedAt": "2024-01-01T00:00:01Z",
                "durationMs": 1000
            },
            "screenshot_base64": STANDARD.encode(vec![7u8; 800]),
            "screenshot_media_type": "image/png"
        })))
        .mount(&server)
        .await;

    let client = DriverClient::new(&server.uri()).unwrap();
    let instruction = CompiledInstruction::new(0, "click-1", ActionType::Click);
    let outcome = client.run_instruction("s1", &instruction).await.unwrap();

    let dir = TempDir::new().unwrap();
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
    let plan = ExecutionPlan::new("exec-1", "wf-1");

    let recorded = writer.record_step_outcome(&plan, outcome).await.unwrap();
    assert_eq!(recorded.artifact_ids.len(), 2);
    assert!(recorded.timeline_artifact_id.is_some());

    let bundle = read_json(&writer.result_path("exec-1"));
    let steps = bundle["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["status"], "completed");

    let artifacts = bundle["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0]["type"], "step_outcome");
    assert_eq!(artifacts[1]["type"], "screenshot_inline");
    assert_eq!(artifacts[1]["size_bytes"], 800);

    assert_eq!(bundle["summary"]["total_steps"], 1);
    assert_eq!(bundle["summary"]["completed_steps"], 1);
    assert_eq!(bundle["summary"]["failed_steps"], 0);
    assert_eq!(bundle["summary"]["total_duration_ms"], 1000);

    let timeline = read_json(&writer.timeline_path("exec-1"));
    assert_eq!(timeline["entries"].as_array().unwrap().len(), 1);
    assert_eq!(timeline["entries"][0]["actionType"], "click");
}

#[tokio::test]
async fn test_screenshot_goes_to_storage_when_configured() {
    let dir = TempDir::new().unwrap();
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path().join("results")))
        .with_storage(Arc::new(FilesystemArtifactStorage::new(dir.path().join("shots"))));
    let plan = ExecutionPlan::new("exec-2", "wf-1");

    let mut outcome = StepOutcome::new(0, "shot", "screenshot");
    outcome.success = true;
    outcome.screenshot = Some(vrooli_core::Screenshot {
        data: vec![1u8; 64],
        media_type: "image/png".to_string(),
        capture_time: None,
        width: 10,
        height: 10,
        hash: String::new(),
        from_cache: false,
        truncated: false,
        source: "test".to_string(),
    });

    writer.record_step_outcome(&plan, outcome).await.unwrap();
    let bundle = writer.snapshot("exec-2").await.unwrap();
    let screenshot = &bundle.artifacts[1];
    assert_eq!(screenshot.artifact_type, ArtifactType::Screenshot);
    assert!(screenshot.storage_url.as_deref().unwrap().starts_with("file://"));
    assert_eq!(
        bundle.timeline_frames[0].screenshot_url,
        screenshot.storage_url
    );
}

#[tokio::test]
async fn test_oversized_dom_is_clamped_and_hashed() {
    let dir = TempDir::new().unwrap();
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
    let plan = ExecutionPlan::new("exec-dom", "wf-1");

    let html = "d".repeat(DOM_SNAPSHOT_MAX_BYTES + 10);
    let original_hash = sha256_hex(html.as_bytes());
    let mut outcome = StepOutcome::new(0, "n1", "navigate");
    outcome.success = true;
    outcome.dom_snapshot = Some(DomSnapshot {
        html,
        ..Default::default()
    });

    writer.record_step_outcome(&plan, outcome).await.unwrap();
    let bundle = writer.snapshot("exec-dom").await.unwrap();

    let dom = bundle
        .artifacts
        .iter()
        .find(|a| a.artifact_type == ArtifactType::DomSnapshot)
        .unwrap();
    assert_eq!(
        dom.payload["html"].as_str().unwrap().len(),
        DOM_SNAPSHOT_MAX_BYTES
    );
    assert_eq!(dom.payload["truncated"], true);
    assert_eq!(
        dom.payload["preview"].as_str().unwrap().chars().count(),
        256
    );

    let core = &bundle.artifacts[0];
    assert_eq!(core.artifact_type, ArtifactType::StepOutcome);
    assert_eq!(core.payload["notes"]["dom_truncated_hash"], original_hash);
}

#[tokio::test]
async fn test_driver_supplied_dom_preview_is_capped() {
    let dir = TempDir::new().unwrap();
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
    let plan = ExecutionPlan::new("exec-preview", "wf-1");

    let mut outcome = StepOutcome::new(0, "n1", "navigate");
    outcome.success = true;
    outcome.dom_snapshot = Some(DomSnapshot {
        html: "<main>ok</main>".to_string(),
        preview: "é".repeat(1000),
        ..Default::default()
    });

    writer.record_step_outcome(&plan, outcome).await.unwrap();
    let bundle = writer.snapshot("exec-preview").await.unwrap();
    let dom = bundle
        .artifacts
        .iter()
        .find(|a| a.artifact_type == ArtifactType::DomSnapshot)
        .unwrap();
    assert_eq!(dom.payload["preview"].as_str().unwrap(), "é".repeat(256));
    assert_eq!(dom.payload["html"], "<main>ok</main>");
}

#[tokio::test]
async fn test_artifact_order_within_step() {
    let dir = TempDir::new().unwrap();
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
    let plan = ExecutionPlan::new("exec-order", "wf-1");

    let trace = dir.path().join("trace.zip");
    std::fs::write(&trace, b"trace-bytes").unwrap();

    let mut outcome = StepOutcome::new(2, "n2", "extract");
    outcome.success = true;
    outcome.extracted_data = Some(json!({"title": "Example"}));
    outcome.console_logs = vec![vrooli_core::ConsoleLogEntry {
        kind: "log".to_string(),
        text: "hello".to_string(),
        timestamp: Utc::now(),
        stack: None,
        location: String::new(),
    }];
    outcome
        .notes
        .insert("trace_path".to_string(), trace.display().to_string());
    outcome.dom_snapshot = Some(DomSnapshot {
        html: "<p>x</p>".to_string(),
        ..Default::default()
    });

    writer.record_step_outcome(&plan, outcome).await.unwrap();
    let bundle = writer.snapshot("exec-order").await.unwrap();
    let kinds: Vec<ArtifactType> = bundle.artifacts.iter().map(|a| a.artifact_type).collect();
    assert_eq!(
        kinds,
        vec![
            ArtifactType::StepOutcome,
            ArtifactType::Console,
            ArtifactType::ExtractedData,
            ArtifactType::TraceMeta,
            ArtifactType::DomSnapshot,
        ]
    );

    let trace_artifact = &bundle.artifacts[3];
    assert_eq!(trace_artifact.payload["inline"], true);
    assert_eq!(
        trace_artifact.payload["base64"],
        STANDARD.encode(b"trace-bytes")
    );
    assert_eq!(bundle.steps[0].artifact_ids.len(), 5);
}

#[tokio::test]
async fn test_mark_crash_is_idempotent_in_effect() {
    let dir = TempDir::new().unwrap();
    let index = index().await;
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path())).with_index(index.clone());
    let plan = ExecutionPlan::new("exec-crash", "wf-1");
    index.upsert_running(&plan).await.unwrap();

    let failure = StepFailure::new(FailureKind::Infra, "driver went away");
    writer.mark_crash("exec-crash", failure.clone()).await.unwrap();
    let first = index.get("exec-crash").await.unwrap().unwrap();

    writer.mark_crash("exec-crash", failure).await.unwrap();
    let second = index.get("exec-crash").await.unwrap().unwrap();

    assert_eq!(first.status, ExecutionStatus::Failed);
    assert_eq!(second.status, ExecutionStatus::Failed);
    assert_eq!(first.completed_at, second.completed_at);
    assert_eq!(second.error_message.as_deref(), Some("driver went away"));

    let bundle = writer.snapshot("exec-crash").await.unwrap();
    assert_eq!(bundle.steps.len(), 2);
    assert!(bundle
        .steps
        .iter()
        .all(|s| s.step_index == -1 && s.node_id == "crash" && s.status == StepStatus::Failed));
    assert_eq!(bundle.summary.failed_steps, 2);
    assert_eq!(bundle.summary.total_steps, 2);
}

#[tokio::test]
async fn test_record_step_updates_index_result_path() {
    let dir = TempDir::new().unwrap();
    let index = index().await;
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path())).with_index(index.clone());
    let plan = ExecutionPlan::new("exec-idx", "wf-9");
    index.upsert_running(&plan).await.unwrap();

    let mut outcome = StepOutcome::new(0, "n", "click");
    outcome.success = true;
    writer.record_step_outcome(&plan, outcome).await.unwrap();
    writer
        .complete("exec-idx", ExecutionStatus::Completed)
        .await
        .unwrap();

    let record = index.get("exec-idx").await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(
        record.result_path.as_deref(),
        Some(writer.result_path("exec-idx").to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn test_telemetry_and_checkpoint_reach_timeline() {
    let dir = TempDir::new().unwrap();
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
    let plan = ExecutionPlan::new("exec-tel", "wf-1");

    writer
        .record_telemetry(
            &plan,
            StepTelemetry::new(1, TelemetryKind::Console, "boom").with_note("error"),
        )
        .await
        .unwrap();
    writer
        .record_telemetry(&plan, StepTelemetry::new(1, TelemetryKind::Other, "ignored"))
        .await
        .unwrap();
    writer.update_checkpoint("exec-tel", 1, 4).await.unwrap();

    let timeline = writer.timeline_snapshot("exec-tel").await.unwrap();
    assert_eq!(timeline.logs.len(), 1);
    assert_eq!(timeline.logs[0].level, LogLevel::Error);
    assert!(timeline.logs[0].id.starts_with("telemetry-1-"));
    assert_eq!(timeline.progress, 50);

    let bundle = writer.snapshot("exec-tel").await.unwrap();
    assert_eq!(bundle.telemetry.len(), 2);

    let on_disk = read_json(&writer.timeline_path("exec-tel"));
    assert_eq!(on_disk["progress"], 50);
    assert_eq!(on_disk["logs"][0]["level"], "ERROR");
}

#[tokio::test]
async fn test_accumulator_reloads_existing_bundle() {
    let dir = TempDir::new().unwrap();
    let plan = ExecutionPlan::new("exec-reload", "wf-1");

    {
        let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
        let mut outcome = StepOutcome::new(0, "n", "click");
        outcome.success = true;
        writer.record_step_outcome(&plan, outcome).await.unwrap();
    }

    let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
    let mut outcome = StepOutcome::new(1, "n2", "click");
    outcome.success = false;
    outcome.failure = Some(StepFailure::new(FailureKind::Engine, "selector missing"));
    writer.record_step_outcome(&plan, outcome).await.unwrap();

    let bundle = writer.snapshot("exec-reload").await.unwrap();
    assert_eq!(bundle.steps.len(), 2);
    assert_eq!(bundle.summary.completed_steps, 1);
    assert_eq!(bundle.summary.failed_steps, 1);
    assert_eq!(bundle.steps[1].error.as_deref(), Some("selector missing"));
}

#[tokio::test]
async fn test_empty_execution_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let writer = ExecutionWriter::new(WriterConfig::new(dir.path()));
    let plan = ExecutionPlan::new("", "wf");
    assert!(writer
        .record_step_outcome(&plan, StepOutcome::new(0, "n", "click"))
        .await
        .is_err());
}
