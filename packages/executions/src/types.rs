// ABOUTME: Result bundle, artifact, telemetry and timeline records written per execution
// ABOUTME: Also defines execution status and the index record persisted in SQLite

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use vrooli_core::{
    BoundingBox, CursorPosition, ElementFocus, HighlightRegion, MaskRegion, Point, StepFailure,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Row of the execution index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub result_path: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    StepOutcome,
    Console,
    Network,
    Assertion,
    ExtractedData,
    Screenshot,
    ScreenshotInline,
    DomSnapshot,
    TraceMeta,
    VideoMeta,
    HarMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResultData {
    pub step_id: String,
    pub step_index: i32,
    pub node_id: String,
    pub step_type: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    #[serde(default)]
    pub final_url: String,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    #[serde(default)]
    pub artifact_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactData {
    pub artifact_id: String,
    pub step_id: String,
    #[serde(default)]
    pub step_index: Option<i32>,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub payload: Map<String, JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Kinds of telemetry the executor and engine stream during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    Console,
    Network,
    Retry,
    Heartbeat,
    Progress,
    Other,
}

/// Telemetry as handed to the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTelemetry {
    pub step_index: i32,
    pub kind: TelemetryKind,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Option<JsonValue>,
}

impl StepTelemetry {
    pub fn new(step_index: i32, kind: TelemetryKind, message: impl Into<String>) -> Self {
        Self {
            step_index,
            kind,
            note: String::new(),
            message: message.into(),
            recorded_at: None,
            payload: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub step_index: i32,
    pub kind: TelemetryKind,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

/// Replay-facing summary of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineFrameData {
    pub step_id: String,
    pub step_index: i32,
    pub node_id: String,
    pub step_type: String,
    pub status: StepStatus,
    pub success: bool,
    pub attempt: i32,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub final_url: String,
    #[serde(default)]
    pub element_bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub click_position: Option<Point>,
    #[serde(default)]
    pub highlight_regions: Vec<HighlightRegion>,
    #[serde(default)]
    pub mask_regions: Vec<MaskRegion>,
    #[serde(default)]
    pub focused_element: Option<ElementFocus>,
    #[serde(default)]
    pub cursor_trail: Vec<CursorPosition>,
    #[serde(default)]
    pub zoom_factor: Option<f64>,
    #[serde(default)]
    pub extracted_data_preview: Option<JsonValue>,
    pub console_log_count: usize,
    pub network_event_count: usize,
    #[serde(default)]
    pub screenshot_artifact_id: Option<String>,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default)]
    pub dom_snapshot_preview: Option<String>,
    #[serde(default)]
    pub dom_snapshot_artifact_id: Option<String>,
    #[serde(default)]
    pub artifact_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub total_duration_ms: i64,
    pub last_updated: DateTime<Utc>,
}

impl Default for BundleSummary {
    fn default() -> Self {
        Self {
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            total_duration_ms: 0,
            last_updated: Utc::now(),
        }
    }
}

/// JSON view of an execution, persisted as `result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub execution_id: String,
    pub workflow_id: String,
    #[serde(default)]
    pub steps: Vec<StepResultData>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactData>,
    #[serde(default)]
    pub telemetry: Vec<TelemetryEntry>,
    #[serde(default)]
    pub timeline_frames: Vec<TimelineFrameData>,
    #[serde(default)]
    pub summary: BundleSummary,
}

impl ResultBundle {
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            steps: Vec::new(),
            artifacts: Vec::new(),
            telemetry: Vec::new(),
            timeline_frames: Vec::new(),
            summary: BundleSummary::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineLog {
    pub id: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub step_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtoTimelineEntry {
    pub id: String,
    pub sequence_num: i32,
    pub step_index: i32,
    pub node_id: String,
    pub action_type: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: i64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub final_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_snapshot_artifact_id: Option<String>,
    #[serde(default)]
    pub artifact_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_position: Option<Point>,
}

/// Proto-shaped view of an execution, persisted as `timeline.proto.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtoTimeline {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub progress: i32,
    #[serde(default)]
    pub current_step_index: Option<i32>,
    #[serde(default)]
    pub entries: Vec<ProtoTimelineEntry>,
    #[serde(default)]
    pub logs: Vec<TimelineLog>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) last_log_nanos: i64,
}

impl ProtoTimeline {
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            progress: 0,
            current_step_index: None,
            entries: Vec::new(),
            logs: Vec::new(),
            updated_at: Utc::now(),
            last_log_nanos: 0,
        }
    }
}

/// What `record_step_outcome` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResult {
    pub step_id: String,
    pub artifact_ids: Vec<String>,
    pub timeline_artifact_id: Option<String>,
}
