// ABOUTME: Snake_case request and response bodies exchanged with the browser driver
// ABOUTME: Session, recording, preview, streaming, input and instruction payloads

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use vrooli_core::CompiledInstruction;

use crate::timeline::{RecordedAction, TimelineEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// How the driver should treat an existing browser context for the same workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReuseMode {
    #[default]
    Fresh,
    Clean,
    Reuse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStreaming {
    #[serde(default)]
    pub callback_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub execution_id: String,
    pub workflow_id: String,
    pub viewport: Viewport,
    pub reuse_mode: ReuseMode,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_streaming: Option<FrameStreaming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<String>,
}

impl CreateSessionRequest {
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CreateSessionResponse {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub active_sessions: Option<u32>,
    #[serde(default)]
    pub max_sessions: Option<u32>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartRecordingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_fps: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingState {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub recording_id: String,
    #[serde(default)]
    pub is_recording: bool,
    #[serde(default)]
    pub action_count: u32,
    #[serde(default)]
    pub frame_streaming: bool,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub stopped_at: Option<String>,
    #[serde(default)]
    pub last_action_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RecordedActionsResponse {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub is_recording: bool,
    #[serde(default)]
    pub actions: Vec<RecordedAction>,
    #[serde(default)]
    pub entries: Vec<TimelineEntry>,
}

/// Recorded actions for a session, always in the legacy shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordedActions {
    pub session_id: String,
    pub is_recording: bool,
    pub actions: Vec<RecordedAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigateRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub capture: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateSelectorResponse {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub match_count: u32,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayPreviewRequest {
    pub actions: Vec<RecordedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub stop_on_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionReplayResult {
    #[serde(default)]
    pub sequence_num: i32,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayPreviewResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub passed_actions: u32,
    #[serde(default)]
    pub failed_actions: u32,
    #[serde(default)]
    pub results: Vec<ActionReplayResult>,
    #[serde(default)]
    pub total_duration_ms: i64,
    #[serde(default)]
    pub stopped_early: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSettingsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf_mode: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSettingsResponse {
    #[serde(default)]
    pub quality: u8,
    #[serde(default)]
    pub fps: u8,
    #[serde(default)]
    pub current_fps: f64,
    #[serde(default)]
    pub scale: String,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(default)]
    pub full_page: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ScreenshotResponse {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Image bytes returned by screenshot and frame endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    pub media_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// User input forwarded into the live browser (pointer, wheel, keyboard).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

/// Instruction as it travels to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionPayload {
    pub index: i32,
    pub node_id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: serde_json::Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload_html: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, JsonValue>,
}

impl From<&CompiledInstruction> for InstructionPayload {
    fn from(instruction: &CompiledInstruction) -> Self {
        Self {
            index: instruction.index,
            node_id: instruction.node_id.clone(),
            action_type: instruction.action_type.clone(),
            params: instruction.params.clone(),
            preload_html: instruction.preload_html.clone(),
            context: instruction.context.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunInstructionRequest {
    pub instruction: InstructionPayload,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunInstructionsRequest {
    pub instructions: Vec<InstructionPayload>,
    #[serde(rename = "async")]
    pub fire_and_forget: bool,
}

/// Raw RunInstruction response before promotion into a StepOutcome.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RunInstructionResponse {
    #[serde(default)]
    pub step_outcome: Option<JsonValue>,
    #[serde(default)]
    pub screenshot_base64: Option<String>,
    #[serde(default)]
    pub screenshot_media_type: Option<String>,
    #[serde(default)]
    pub screenshot_width: Option<u32>,
    #[serde(default)]
    pub screenshot_height: Option<u32>,
    #[serde(default)]
    pub dom_html: Option<String>,
    #[serde(default)]
    pub dom_preview: Option<String>,
    #[serde(default)]
    pub trace_path: Option<String>,
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub har_path: Option<String>,
}
