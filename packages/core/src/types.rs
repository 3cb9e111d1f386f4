// ABOUTME: Step outcome, execution plan and instruction contracts
// ABOUTME: Shared between the driver client, the execution writer and the workflow executor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::base64_bytes;

/// Identity of one workflow execution. Carried by every write to the execution writer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub execution_id: String,
    pub workflow_id: String,
}

impl ExecutionPlan {
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
        }
    }
}

/// Closed set of automation actions understood by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Navigate,
    Click,
    Input,
    Wait,
    Assert,
    Scroll,
    Select,
    Evaluate,
    Keyboard,
    Hover,
    Screenshot,
    Focus,
    Blur,
    Subflow,
    Extract,
    UploadFile,
    Download,
    FrameSwitch,
    TabSwitch,
    SetCookie,
    Shortcut,
    DragDrop,
    Gesture,
    NetworkMock,
    Rotate,
    SetVariable,
    Loop,
    Conditional,
}

impl ActionType {
    pub const ALL: [ActionType; 28] = [
        Self::Navigate,
        Self::Click,
        Self::Input,
        Self::Wait,
        Self::Assert,
        Self::Scroll,
        Self::Select,
        Self::Evaluate,
        Self::Keyboard,
        Self::Hover,
        Self::Screenshot,
        Self::Focus,
        Self::Blur,
        Self::Subflow,
        Self::Extract,
        Self::UploadFile,
        Self::Download,
        Self::FrameSwitch,
        Self::TabSwitch,
        Self::SetCookie,
        Self::Shortcut,
        Self::DragDrop,
        Self::Gesture,
        Self::NetworkMock,
        Self::Rotate,
        Self::SetVariable,
        Self::Loop,
        Self::Conditional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Input => "input",
            Self::Wait => "wait",
            Self::Assert => "assert",
            Self::Scroll => "scroll",
            Self::Select => "select",
            Self::Evaluate => "evaluate",
            Self::Keyboard => "keyboard",
            Self::Hover => "hover",
            Self::Screenshot => "screenshot",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Subflow => "subflow",
            Self::Extract => "extract",
            Self::UploadFile => "uploadFile",
            Self::Download => "download",
            Self::FrameSwitch => "frameSwitch",
            Self::TabSwitch => "tabSwitch",
            Self::SetCookie => "setCookie",
            Self::Shortcut => "shortcut",
            Self::DragDrop => "dragDrop",
            Self::Gesture => "gesture",
            Self::NetworkMock => "networkMock",
            Self::Rotate => "rotate",
            Self::SetVariable => "setVariable",
            Self::Loop => "loop",
            Self::Conditional => "conditional",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown action type: {0}")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    /// Accepts the camelCase name, any casing of it, snake/kebab variants and
    /// the `ACTION_TYPE_*` enum spelling used on the wire.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let stripped = trimmed
            .strip_prefix("ACTION_TYPE_")
            .unwrap_or(trimmed);
        let normalized: String = stripped
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(|c| c.to_lowercase())
            .collect();

        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().to_lowercase() == normalized)
            .ok_or_else(|| UnknownActionType(s.to_string()))
    }
}

/// One compiled instruction handed to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
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
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_stop_on_failure")]
    pub stop_on_failure: bool,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_stop_on_failure() -> bool {
    true
}

impl CompiledInstruction {
    pub fn new(index: i32, node_id: impl Into<String>, action: ActionType) -> Self {
        Self {
            index,
            node_id: node_id.into(),
            action_type: action.as_str().to_string(),
            params: serde_json::Map::new(),
            preload_html: None,
            context: BTreeMap::new(),
            max_attempts: 1,
            stop_on_failure: true,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Classification of step failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Engine,
    Infra,
    Orchestration,
    User,
    Timeout,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engine => "engine",
            Self::Infra => "infra",
            Self::Orchestration => "orchestration",
            Self::User => "user",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub kind: FailureKind,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fatal: bool,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: String::new(),
            message: message.into(),
            fatal: false,
            retryable: false,
            occurred_at: Some(Utc::now()),
            source: String::new(),
        }
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    #[serde(default, with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub capture_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLogEntry {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub status: Option<i32>,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub failure: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub request_body_preview: String,
    #[serde(default)]
    pub response_body_preview: String,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionOutcome {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub expected: Option<JsonValue>,
    #[serde(default)]
    pub actual: Option<JsonValue>,
    pub success: bool,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub point: Point,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub elapsed_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRegion {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub padding: i32,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskRegion {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFocus {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

/// Element metadata captured around an action target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub inner_text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub aria_label: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

/// Result of one instruction attempt, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub payload_version: String,
    #[serde(default)]
    pub step_index: i32,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub step_type: String,
    #[serde(default)]
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(rename = "finalURL", alias = "finalUrl", default)]
    pub final_url: String,
    pub success: bool,
    #[serde(default)]
    pub failure: Option<StepFailure>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    #[serde(default)]
    pub screenshot: Option<Screenshot>,
    #[serde(default)]
    pub dom_snapshot: Option<DomSnapshot>,
    #[serde(default)]
    pub console_logs: Vec<ConsoleLogEntry>,
    #[serde(default)]
    pub network: Vec<NetworkEvent>,
    #[serde(default)]
    pub assertion: Option<AssertionOutcome>,
    #[serde(default)]
    pub extracted_data: Option<JsonValue>,
    #[serde(default)]
    pub element_snapshot: Option<ElementSnapshot>,
    #[serde(default)]
    pub focused_element: Option<ElementFocus>,
    #[serde(default)]
    pub click_position: Option<Point>,
    #[serde(default)]
    pub element_bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub highlight_regions: Vec<HighlightRegion>,
    #[serde(default)]
    pub mask_regions: Vec<MaskRegion>,
    #[serde(default)]
    pub cursor_trail: Vec<CursorPosition>,
    #[serde(default)]
    pub zoom_factor: Option<f64>,
}

impl StepOutcome {
    /// Minimal outcome for a step that started at `started_at`.
    pub fn new(step_index: i32, node_id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            schema_version: crate::constants::STEP_OUTCOME_SCHEMA_VERSION.to_string(),
            payload_version: crate::constants::STEP_OUTCOME_PAYLOAD_VERSION.to_string(),
            step_index,
            node_id: node_id.into(),
            step_type: step_type.into(),
            attempt: 1,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
            final_url: String::new(),
            success: false,
            failure: None,
            notes: BTreeMap::new(),
            screenshot: None,
            dom_snapshot: None,
            console_logs: Vec::new(),
            network: Vec::new(),
            assertion: None,
            extracted_data: None,
            element_snapshot: None,
            focused_element: None,
            click_position: None,
            element_bounding_box: None,
            highlight_regions: Vec::new(),
            mask_regions: Vec::new(),
            cursor_trail: Vec::new(),
            zoom_factor: None,
        }
    }

    /// True when extracted data carries something worth persisting.
    pub fn has_extracted_data(&self) -> bool {
        match &self.extracted_data {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Object(map)) => !map.is_empty(),
            Some(JsonValue::Array(items)) => !items.is_empty(),
            Some(JsonValue::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_parses_wire_spellings() {
        assert_eq!("click".parse::<ActionType>().unwrap(), ActionType::Click);
        assert_eq!(
            "ACTION_TYPE_UPLOAD_FILE".parse::<ActionType>().unwrap(),
            ActionType::UploadFile
        );
        assert_eq!(
            "drag_drop".parse::<ActionType>().unwrap(),
            ActionType::DragDrop
        );
        assert_eq!(
            "frameSwitch".parse::<ActionType>().unwrap(),
            ActionType::FrameSwitch
        );
        assert!("teleport".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_action_type_serde_uses_camel_case() {
        let json = serde_json::to_string(&ActionType::SetVariable).unwrap();
        assert_eq!(json, "\"setVariable\"");
        for action in ActionType::ALL {
            let parsed: ActionType = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_step_outcome_decodes_engine_payload() {
        let payload = serde_json::json!({
            "stepIndex": 0,
            "stepType": "click",
            "success": true,
            "startedAt": "2024-01-01T00:00:00Z",
            "completedAt": "2024-01-01T00:00:01Z",
            "durationMs": 1000
        });
        let outcome: StepOutcome = serde_json::from_value(payload).unwrap();
        assert_eq!(outcome.step_type, "click");
        assert_eq!(outcome.duration_ms, 1000);
        assert!(outcome.notes.is_empty());
        assert!(outcome.console_logs.is_empty());
    }

    #[test]
    fn test_has_extracted_data() {
        let mut outcome = StepOutcome::new(0, "n1", "extract");
        assert!(!outcome.has_extracted_data());
        outcome.extracted_data = Some(serde_json::json!({}));
        assert!(!outcome.has_extracted_data());
        outcome.extracted_data = Some(serde_json::json!({"title": "Home"}));
        assert!(outcome.has_extracted_data());
    }
}
