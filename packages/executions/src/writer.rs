// ABOUTME: Accumulates step outcomes, artifacts, telemetry and timeline per execution
// ABOUTME: Flushes result.json and timeline.proto.json atomically after every update

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use vrooli_core::constants::{
    DOM_PREVIEW_MAX_CHARS, DOM_SNAPSHOT_MAX_BYTES, EMBEDDED_EXTERNAL_FILE_MAX_BYTES,
};
use vrooli_core::{
    new_id, short_id, truncate_chars, truncate_utf8, ExecutionPlan, FailureKind, StepFailure,
    StepOutcome,
};

use crate::artifacts::ArtifactStorage;
use crate::error::{WriterError, WriterResult};
use crate::sanitizer::sanitize_outcome;
use crate::storage::ExecutionIndex;
use crate::types::*;

pub const RESULT_FILE: &str = "result.json";
pub const TIMELINE_FILE: &str = "timeline.proto.json";

const CRASH_NODE_ID: &str = "crash";
const EXTRACTED_PREVIEW_MAX_BYTES: usize = 1024;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Root under which `<executionId>/result.json` is written.
    pub data_dir: PathBuf,
}

impl WriterConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

type Shared<T> = Arc<Mutex<T>>;

pub struct ExecutionWriter {
    config: WriterConfig,
    index: Option<Arc<dyn ExecutionIndex>>,
    storage: Option<Arc<dyn ArtifactStorage>>,
    bundles: RwLock<HashMap<String, Shared<ResultBundle>>>,
    timelines: RwLock<HashMap<String, Shared<ProtoTimeline>>>,
}

impl ExecutionWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            index: None,
            storage: None,
            bundles: RwLock::new(HashMap::new()),
            timelines: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_index(mut self, index: Arc<dyn ExecutionIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ArtifactStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn index(&self) -> Option<&Arc<dyn ExecutionIndex>> {
        self.index.as_ref()
    }

    pub fn result_path(&self, execution_id: &str) -> PathBuf {
        self.config.data_dir.join(execution_id).join(RESULT_FILE)
    }

    pub fn timeline_path(&self, execution_id: &str) -> PathBuf {
        self.config.data_dir.join(execution_id).join(TIMELINE_FILE)
    }

    /// Sanitize and persist one step outcome together with its artifacts.
    pub async fn record_step_outcome(
        &self,
        plan: &ExecutionPlan,
        outcome: StepOutcome,
    ) -> WriterResult<RecordResult> {
        validate_plan(plan)?;
        let outcome = sanitize_outcome(outcome);

        let bundle = self.bundle_for(&plan.execution_id, &plan.workflow_id).await;
        let timeline = self.timeline_for(&plan.execution_id, &plan.workflow_id).await;
        let mut bundle = bundle.lock().await;
        let mut timeline = timeline.lock().await;

        let step_id = new_id();
        let status = if outcome.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };

        let built = self.build_artifacts(&plan.execution_id, &step_id, &outcome).await?;
        let artifact_ids: Vec<String> = built
            .artifacts
            .iter()
            .map(|a| a.artifact_id.clone())
            .collect();

        let mut metadata = Map::new();
        metadata.insert("attempt".to_string(), json!(outcome.attempt));
        metadata.insert(
            "payload_version".to_string(),
            json!(outcome.payload_version),
        );

        bundle.steps.push(StepResultData {
            step_id: step_id.clone(),
            step_index: outcome.step_index,
            node_id: outcome.node_id.clone(),
            step_type: outcome.step_type.clone(),
            status,
            started_at: outcome.started_at,
            completed_at: outcome.completed_at,
            duration_ms: outcome.duration_ms,
            error: outcome.failure.as_ref().map(|f| f.message.clone()),
            failure: outcome.failure.clone(),
            final_url: outcome.final_url.clone(),
            metadata,
            artifact_ids: artifact_ids.clone(),
        });
        bundle.artifacts.extend(built.artifacts);

        bundle.timeline_frames.push(TimelineFrameData {
            step_id: step_id.clone(),
            step_index: outcome.step_index,
            node_id: outcome.node_id.clone(),
            step_type: outcome.step_type.clone(),
            status,
            success: outcome.success,
            attempt: outcome.attempt,
            duration_ms: outcome.duration_ms,
            started_at: outcome.started_at,
            completed_at: outcome.completed_at,
            final_url: outcome.final_url.clone(),
            element_bounding_box: outcome.element_bounding_box,
            click_position: outcome.click_position,
            highlight_regions: outcome.highlight_regions.clone(),
            mask_regions: outcome.mask_regions.clone(),
            focused_element: outcome.focused_element.clone(),
            cursor_trail: outcome.cursor_trail.clone(),
            zoom_factor: outcome.zoom_factor,
            extracted_data_preview: outcome
                .has_extracted_data()
                .then(|| preview_json(outcome.extracted_data.as_ref()))
                .flatten(),
            console_log_count: outcome.console_logs.len(),
            network_event_count: outcome.network.len(),
            screenshot_artifact_id: built.screenshot_artifact_id.clone(),
            screenshot_url: built.screenshot_url.clone(),
            dom_snapshot_preview: built.dom_preview.clone(),
            dom_snapshot_artifact_id: built.dom_artifact_id.clone(),
            artifact_ids: artifact_ids.clone(),
        });
        refresh_summary(&mut bundle);

        let sequence_num = timeline.entries.len() as i32;
        timeline.entries.push(ProtoTimelineEntry {
            id: step_id.clone(),
            sequence_num,
            step_index: outcome.step_index,
            node_id: outcome.node_id.clone(),
            action_type: outcome.step_type.clone(),
            timestamp: outcome.completed_at.unwrap_or(outcome.started_at),
            duration_ms: outcome.duration_ms,
            success: outcome.success,
            error: outcome.failure.as_ref().map(|f| f.message.clone()),
            final_url: outcome.final_url.clone(),
            screenshot_artifact_id: built.screenshot_artifact_id.clone(),
            dom_snapshot_artifact_id: built.dom_artifact_id.clone(),
            artifact_ids: artifact_ids.clone(),
            element_bounding_box: outcome.element_bounding_box,
            click_position: outcome.click_position,
        });
        timeline.current_step_index = Some(outcome.step_index);
        timeline.updated_at = Utc::now();

        let bundle_written = self.flush(&bundle, &timeline).await;
        if bundle_written {
            self.update_index_path(&plan.execution_id).await;
        }

        debug!(
            execution_id = %plan.execution_id,
            step_index = outcome.step_index,
            artifacts = artifact_ids.len(),
            "Recorded step outcome"
        );

        Ok(RecordResult {
            step_id,
            artifact_ids,
            timeline_artifact_id: built.screenshot_artifact_id,
        })
    }

    /// Append a telemetry entry; console, network, retry, heartbeat and progress
    /// telemetry also become timeline logs.
    pub async fn record_telemetry(
        &self,
        plan: &ExecutionPlan,
        telemetry: StepTelemetry,
    ) -> WriterResult<()> {
        validate_plan(plan)?;
        let timestamp = telemetry.recorded_at.unwrap_or_else(Utc::now);

        let bundle = self.bundle_for(&plan.execution_id, &plan.workflow_id).await;
        let timeline = self.timeline_for(&plan.execution_id, &plan.workflow_id).await;
        let mut bundle = bundle.lock().await;
        let mut timeline = timeline.lock().await;

        let message = if telemetry.message.is_empty() {
            telemetry.note.clone()
        } else {
            telemetry.message.clone()
        };

        if let Some(level) = log_level_for(telemetry.kind, &telemetry.note) {
            let nanos = next_log_nanos(&mut timeline, timestamp);
            timeline.logs.push(TimelineLog {
                id: format!("telemetry-{}-{}", telemetry.step_index, nanos),
                level,
                message: message.clone(),
                step_name: format!("step-{}", telemetry.step_index),
                timestamp,
            });
            timeline.updated_at = Utc::now();
        }

        bundle.telemetry.push(TelemetryEntry {
            step_index: telemetry.step_index,
            kind: telemetry.kind,
            note: telemetry.note,
            message,
            timestamp,
            payload: telemetry.payload,
        });
        bundle.summary.last_updated = Utc::now();

        self.flush(&bundle, &timeline).await;
        Ok(())
    }

    /// Record a synthetic failed step and move the index record to `failed`.
    pub async fn mark_crash(&self, execution_id: &str, failure: StepFailure) -> WriterResult<()> {
        if execution_id.trim().is_empty() {
            return Err(WriterError::InvalidPlan("execution id is empty".to_string()));
        }

        let bundle = self.bundle_for(execution_id, "").await;
        let workflow_id = bundle.lock().await.workflow_id.clone();
        let timeline = self.timeline_for(execution_id, &workflow_id).await;
        let mut bundle = bundle.lock().await;
        let mut timeline = timeline.lock().await;

        let now = Utc::now();
        let mut metadata = Map::new();
        metadata.insert("failure_kind".to_string(), json!(failure.kind.as_str()));

        bundle.steps.push(StepResultData {
            step_id: new_id(),
            step_index: -1,
            node_id: CRASH_NODE_ID.to_string(),
            step_type: CRASH_NODE_ID.to_string(),
            status: StepStatus::Failed,
            started_at: failure.occurred_at.unwrap_or(now),
            completed_at: Some(now),
            duration_ms: 0,
            error: Some(failure.message.clone()),
            failure: Some(failure.clone()),
            final_url: String::new(),
            metadata,
            artifact_ids: Vec::new(),
        });
        refresh_summary(&mut bundle);

        timeline.status = if failure.kind == FailureKind::Cancelled {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Failed
        };
        let nanos = next_log_nanos(&mut timeline, now);
        timeline.logs.push(TimelineLog {
            id: format!("crash-{}", nanos),
            level: LogLevel::Error,
            message: format!("execution crashed ({}): {}", failure.kind.as_str(), failure.message),
            step_name: CRASH_NODE_ID.to_string(),
            timestamp: now,
        });
        timeline.updated_at = now;

        self.flush(&bundle, &timeline).await;

        if let Some(index) = &self.index {
            if let Err(e) = index.mark_failed(execution_id, &failure.message, now).await {
                warn!(execution_id = %execution_id, "Failed to mark execution failed in index: {}", e);
            }
        }
        Ok(())
    }

    /// Store progress `(stepIndex+1)*100/totalSteps`, clamped to 0..=100.
    pub async fn update_checkpoint(
        &self,
        execution_id: &str,
        step_index: i32,
        total_steps: i32,
    ) -> WriterResult<()> {
        if execution_id.trim().is_empty() {
            return Err(WriterError::InvalidPlan("execution id is empty".to_string()));
        }

        let bundle = self.bundle_for(execution_id, "").await;
        let workflow_id = bundle.lock().await.workflow_id.clone();
        let timeline = self.timeline_for(execution_id, &workflow_id).await;
        let bundle = bundle.lock().await;
        let mut timeline = timeline.lock().await;

        timeline.progress = checkpoint_progress(step_index, total_steps);
        timeline.current_step_index = Some(step_index);
        timeline.updated_at = Utc::now();

        self.flush(&bundle, &timeline).await;
        Ok(())
    }

    /// Flush a terminal summary and record the final status in the index.
    pub async fn complete(&self, execution_id: &str, status: ExecutionStatus) -> WriterResult<()> {
        if execution_id.trim().is_empty() {
            return Err(WriterError::InvalidPlan("execution id is empty".to_string()));
        }

        let bundle = self.bundle_for(execution_id, "").await;
        let workflow_id = bundle.lock().await.workflow_id.clone();
        let timeline = self.timeline_for(execution_id, &workflow_id).await;
        let mut bundle = bundle.lock().await;
        let mut timeline = timeline.lock().await;

        let now = Utc::now();
        refresh_summary(&mut bundle);
        timeline.status = status;
        if status == ExecutionStatus::Completed {
            timeline.progress = 100;
        }
        let nanos = next_log_nanos(&mut timeline, now);
        let summary = &bundle.summary;
        timeline.logs.push(TimelineLog {
            id: format!("summary-{}", nanos),
            level: if status == ExecutionStatus::Completed {
                LogLevel::Info
            } else {
                LogLevel::Warn
            },
            message: format!(
                "execution {}: {} of {} steps completed, {} failed",
                status.as_str(),
                summary.completed_steps,
                summary.total_steps,
                summary.failed_steps
            ),
            step_name: "summary".to_string(),
            timestamp: now,
        });
        timeline.updated_at = now;

        self.flush(&bundle, &timeline).await;

        if let Some(index) = &self.index {
            if let Err(e) = index.mark_completed(execution_id, status, now).await {
                warn!(execution_id = %execution_id, "Failed to record terminal status in index: {}", e);
            }
        }
        Ok(())
    }

    /// Copy of the in-memory bundle, if the execution has been touched.
    pub async fn snapshot(&self, execution_id: &str) -> Option<ResultBundle> {
        let shared = self.bundles.read().await.get(execution_id).cloned()?;
        let bundle = shared.lock().await;
        Some(bundle.clone())
    }

    pub async fn timeline_snapshot(&self, execution_id: &str) -> Option<ProtoTimeline> {
        let shared = self.timelines.read().await.get(execution_id).cloned()?;
        let timeline = shared.lock().await;
        Some(timeline.clone())
    }

    /// Drop in-memory accumulators. Files on disk stay.
    pub async fn release(&self, execution_id: &str) {
        self.bundles.write().await.remove(execution_id);
        self.timelines.write().await.remove(execution_id);
    }

    async fn bundle_for(&self, execution_id: &str, workflow_id: &str) -> Shared<ResultBundle> {
        if let Some(existing) = self.bundles.read().await.get(execution_id) {
            return existing.clone();
        }

        let loaded = read_json::<ResultBundle>(&self.result_path(execution_id))
            .await
            .unwrap_or_else(|| ResultBundle::new(execution_id, workflow_id));

        let mut bundles = self.bundles.write().await;
        bundles
            .entry(execution_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone()
    }

    async fn timeline_for(&self, execution_id: &str, workflow_id: &str) -> Shared<ProtoTimeline> {
        if let Some(existing) = self.timelines.read().await.get(execution_id) {
            return existing.clone();
        }

        let loaded = read_json::<ProtoTimeline>(&self.timeline_path(execution_id))
            .await
            .unwrap_or_else(|| ProtoTimeline::new(execution_id, workflow_id));

        let mut timelines = self.timelines.write().await;
        timelines
            .entry(execution_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone()
    }

    /// Write both files. Failures are logged; returns whether result.json landed.
    async fn flush(&self, bundle: &ResultBundle, timeline: &ProtoTimeline) -> bool {
        let result_path = self.result_path(&bundle.execution_id);
        let bundle_written = match write_json_atomic(&result_path, bundle).await {
            Ok(()) => true,
            Err(e) => {
                warn!(execution_id = %bundle.execution_id, "Failed to write result bundle: {}", e);
                false
            }
        };

        let timeline_path = self.timeline_path(&bundle.execution_id);
        if let Err(e) = write_json_atomic(&timeline_path, timeline).await {
            warn!(execution_id = %bundle.execution_id, "Failed to write timeline: {}", e);
        }

        bundle_written
    }

    async fn update_index_path(&self, execution_id: &str) {
        let Some(index) = &self.index else {
            return;
        };
        let path = self.result_path(execution_id);
        if let Err(e) = index
            .update_result_path(execution_id, &path.to_string_lossy())
            .await
        {
            warn!(execution_id = %execution_id, "Failed to update execution index: {}", e);
        }
    }

    async fn build_artifacts(
        &self,
        execution_id: &str,
        step_id: &str,
        outcome: &StepOutcome,
    ) -> WriterResult<BuiltArtifacts> {
        let step_index = outcome.step_index;
        let mut built = BuiltArtifacts::default();

        built.artifacts.push(new_artifact(
            step_id,
            step_index,
            ArtifactType::StepOutcome,
            Some("Step outcome"),
            into_object(serde_json::to_value(outcome)?),
        ));

        if !outcome.console_logs.is_empty() {
            let mut payload = Map::new();
            payload.insert("entries".to_string(), serde_json::to_value(&outcome.console_logs)?);
            built.artifacts.push(new_artifact(
                step_id,
                step_index,
                ArtifactType::Console,
                Some("Console logs"),
                payload,
            ));
        }

        if !outcome.network.is_empty() {
            let mut payload = Map::new();
            payload.insert("events".to_string(), serde_json::to_value(&outcome.network)?);
            built.artifacts.push(new_artifact(
                step_id,
                step_index,
                ArtifactType::Network,
                Some("Network events"),
                payload,
            ));
        }

        if let Some(assertion) = &outcome.assertion {
            built.artifacts.push(new_artifact(
                step_id,
                step_index,
                ArtifactType::Assertion,
                Some("Assertion"),
                into_object(serde_json::to_value(assertion)?),
            ));
        }

        if outcome.has_extracted_data() {
            let mut payload = Map::new();
            payload.insert(
                "value".to_string(),
                outcome.extracted_data.clone().unwrap_or(JsonValue::Null),
            );
            built.artifacts.push(new_artifact(
                step_id,
                step_index,
                ArtifactType::ExtractedData,
                Some("Extracted data"),
                payload,
            ));
        }

        for (note_key, kind, label, content_type) in [
            (vrooli_driver::NOTE_VIDEO_PATH, ArtifactType::VideoMeta, "Video", "video/webm"),
            (vrooli_driver::NOTE_TRACE_PATH, ArtifactType::TraceMeta, "Trace", "application/zip"),
            (vrooli_driver::NOTE_HAR_PATH, ArtifactType::HarMeta, "HAR", "application/json"),
        ] {
            let Some(path) = outcome.notes.get(note_key) else {
                continue;
            };
            if let Some(artifact) =
                external_file_artifact(step_id, step_index, kind, label, content_type, path).await
            {
                built.artifacts.push(artifact);
            }
        }

        if let Some(shot) = outcome.screenshot.as_ref().filter(|s| !s.data.is_empty()) {
            let stored = match &self.storage {
                Some(storage) => match storage
                    .store_screenshot(execution_id, step_index, &shot.data, &shot.media_type)
                    .await
                {
                    Ok(stored) => stored,
                    Err(e) => {
                        warn!(execution_id = %execution_id, step_index, "Screenshot storage failed, inlining: {}", e);
                        None
                    }
                },
                None => None,
            };

            let mut payload = Map::new();
            payload.insert("width".to_string(), json!(shot.width));
            payload.insert("height".to_string(), json!(shot.height));
            payload.insert("media_type".to_string(), json!(shot.media_type));
            payload.insert("truncated".to_string(), json!(shot.truncated));
            if !shot.hash.is_empty() {
                payload.insert("hash".to_string(), json!(shot.hash));
            }

            let artifact = match stored {
                Some(object) => {
                    built.screenshot_url = Some(object.url.clone());
                    let mut artifact = new_artifact(
                        step_id,
                        step_index,
                        ArtifactType::Screenshot,
                        Some("Screenshot"),
                        payload,
                    );
                    artifact.storage_url = Some(object.url);
                    artifact.thumbnail_url = object.thumbnail_url;
                    artifact.size_bytes = Some(object.size_bytes);
                    artifact.content_type = Some(shot.media_type.clone());
                    artifact
                }
                None => {
                    payload.insert("base64".to_string(), json!(STANDARD.encode(&shot.data)));
                    let mut artifact = new_artifact(
                        step_id,
                        step_index,
                        ArtifactType::ScreenshotInline,
                        Some("Screenshot"),
                        payload,
                    );
                    artifact.size_bytes = Some(shot.data.len() as i64);
                    artifact.content_type = Some(shot.media_type.clone());
                    artifact
                }
            };
            built.screenshot_artifact_id = Some(artifact.artifact_id.clone());
            built.artifacts.push(artifact);
        }

        if let Some(dom) = &outcome.dom_snapshot {
            let html = truncate_utf8(&dom.html, DOM_SNAPSHOT_MAX_BYTES);
            let clamped = html.len() < dom.html.len();
            let preview = if dom.preview.is_empty() {
                truncate_chars(html, DOM_PREVIEW_MAX_CHARS)
            } else {
                truncate_chars(&dom.preview, DOM_PREVIEW_MAX_CHARS)
            };

            let mut payload = Map::new();
            payload.insert("html".to_string(), json!(html));
            payload.insert("preview".to_string(), json!(preview));
            payload.insert("truncated".to_string(), json!(dom.truncated || clamped));
            if !dom.hash.is_empty() {
                payload.insert("hash".to_string(), json!(dom.hash));
            }

            let mut artifact = new_artifact(
                step_id,
                step_index,
                ArtifactType::DomSnapshot,
                Some("DOM snapshot"),
                payload,
            );
            artifact.content_type = Some("text/html".to_string());
            artifact.size_bytes = Some(html.len() as i64);
            built.dom_artifact_id = Some(artifact.artifact_id.clone());
            built.dom_preview = Some(preview);
            built.artifacts.push(artifact);
        }

        Ok(built)
    }
}

#[derive(Default)]
struct BuiltArtifacts {
    artifacts: Vec<ArtifactData>,
    screenshot_artifact_id: Option<String>,
    screenshot_url: Option<String>,
    dom_artifact_id: Option<String>,
    dom_preview: Option<String>,
}

fn validate_plan(plan: &ExecutionPlan) -> WriterResult<()> {
    if plan.execution_id.trim().is_empty() {
        return Err(WriterError::InvalidPlan("execution id is empty".to_string()));
    }
    Ok(())
}

fn new_artifact(
    step_id: &str,
    step_index: i32,
    artifact_type: ArtifactType,
    label: Option<&str>,
    payload: Map<String, JsonValue>,
) -> ArtifactData {
    ArtifactData {
        artifact_id: new_id(),
        step_id: step_id.to_string(),
        step_index: Some(step_index),
        artifact_type,
        label: label.map(str::to_string),
        storage_url: None,
        thumbnail_url: None,
        content_type: None,
        size_bytes: None,
        payload,
        created_at: Utc::now(),
    }
}

async fn external_file_artifact(
    step_id: &str,
    step_index: i32,
    kind: ArtifactType,
    label: &str,
    content_type: &str,
    path: &str,
) -> Option<ArtifactData> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    let size = metadata.len();

    let mut payload = Map::new();
    payload.insert("path".to_string(), json!(path));
    payload.insert("size_bytes".to_string(), json!(size));
    if size <= EMBEDDED_EXTERNAL_FILE_MAX_BYTES {
        if let Ok(bytes) = tokio::fs::read(path).await {
            payload.insert("inline".to_string(), json!(true));
            payload.insert("base64".to_string(), json!(STANDARD.encode(bytes)));
        }
    }

    let mut artifact = new_artifact(step_id, step_index, kind, Some(label), payload);
    artifact.storage_url = Some(format!("file://{}", path));
    artifact.content_type = Some(content_type.to_string());
    artifact.size_bytes = Some(size as i64);
    Some(artifact)
}

fn into_object(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

fn preview_json(value: Option<&JsonValue>) -> Option<JsonValue> {
    let value = value?;
    let rendered = serde_json::to_string(value).ok()?;
    if rendered.len() <= EXTRACTED_PREVIEW_MAX_BYTES {
        Some(value.clone())
    } else {
        Some(JsonValue::String(
            truncate_utf8(&rendered, EXTRACTED_PREVIEW_MAX_BYTES).to_string(),
        ))
    }
}

fn refresh_summary(bundle: &mut ResultBundle) {
    let completed = bundle
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .count();
    bundle.summary.total_steps = bundle.steps.len();
    bundle.summary.completed_steps = completed;
    bundle.summary.failed_steps = bundle.steps.len() - completed;
    bundle.summary.total_duration_ms = bundle.steps.iter().map(|s| s.duration_ms).sum();
    bundle.summary.last_updated = Utc::now();
}

pub(crate) fn checkpoint_progress(step_index: i32, total_steps: i32) -> i32 {
    if total_steps <= 0 {
        return 0;
    }
    let progress = (i64::from(step_index) + 1) * 100 / i64::from(total_steps);
    progress.clamp(0, 100) as i32
}

/// Map telemetry to a timeline log level; `None` means no log line.
pub(crate) fn log_level_for(kind: TelemetryKind, note: &str) -> Option<LogLevel> {
    let note = note.trim().to_ascii_lowercase();
    match kind {
        TelemetryKind::Console => Some(match note.as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" | "verbose" => LogLevel::Debug,
            _ => LogLevel::Info,
        }),
        TelemetryKind::Network => Some(if note.contains("fail") || note.contains("error") {
            LogLevel::Warn
        } else {
            LogLevel::Debug
        }),
        TelemetryKind::Retry => Some(LogLevel::Warn),
        TelemetryKind::Heartbeat => Some(LogLevel::Debug),
        TelemetryKind::Progress => Some(LogLevel::Info),
        TelemetryKind::Other => None,
    }
}

/// Strictly increasing nanosecond stamp for log ids within one timeline.
fn next_log_nanos(timeline: &mut ProtoTimeline, at: DateTime<Utc>) -> i64 {
    let candidate = at.timestamp_nanos_opt().unwrap_or(i64::MAX);
    let nanos = candidate.max(timeline.last_log_nanos + 1);
    timeline.last_log_nanos = nanos;
    nanos
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Write pretty JSON through a sibling temp file and rename it into place.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> WriterResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    let parent = path
        .parent()
        .ok_or_else(|| WriterError::InvalidPlan(format!("no parent for {}", path.display())))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| WriterError::io(parent, e))?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("bundle");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, std::process::id(), short_id()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| WriterError::io(&tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| WriterError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| WriterError::io(&tmp, e))?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| WriterError::io(&tmp, e))?;
        }

        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| WriterError::io(path, e))
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_progress_is_clamped() {
        assert_eq!(checkpoint_progress(0, 4), 25);
        assert_eq!(checkpoint_progress(3, 4), 100);
        assert_eq!(checkpoint_progress(9, 4), 100);
        assert_eq!(checkpoint_progress(-5, 4), 0);
        assert_eq!(checkpoint_progress(0, 0), 0);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(log_level_for(TelemetryKind::Console, "ERROR"), Some(LogLevel::Error));
        assert_eq!(log_level_for(TelemetryKind::Console, "warning"), Some(LogLevel::Warn));
        assert_eq!(log_level_for(TelemetryKind::Console, "log"), Some(LogLevel::Info));
        assert_eq!(log_level_for(TelemetryKind::Network, "request failed"), Some(LogLevel::Warn));
        assert_eq!(log_level_for(TelemetryKind::Network, ""), Some(LogLevel::Debug));
        assert_eq!(log_level_for(TelemetryKind::Retry, ""), Some(LogLevel::Warn));
        assert_eq!(log_level_for(TelemetryKind::Heartbeat, ""), Some(LogLevel::Debug));
        assert_eq!(log_level_for(TelemetryKind::Progress, ""), Some(LogLevel::Info));
        assert_eq!(log_level_for(TelemetryKind::Other, "error"), None);
    }

    #[test]
    fn test_log_nanos_are_strictly_increasing() {
        let mut timeline = ProtoTimeline::new("e", "w");
        let at = Utc::now();
        let a = next_log_nanos(&mut timeline, at);
        let b = next_log_nanos(&mut timeline, at);
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_write_json_atomic_leaves_no_temp_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("result.json");
        write_json_atomic(&path, &json!({"a": 1})).await.unwrap();
        write_json_atomic(&path, &json!({"a": 2})).await.unwrap();

        let written: JsonValue =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["a"], 2);
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }
}
