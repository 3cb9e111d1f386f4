// ABOUTME: Wire timeline entries and legacy recorded actions, with conversion both ways
// ABOUTME: Promotes a closed set of per-action parameters into the legacy payload map

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use vrooli_core::{ActionType, BoundingBox, Point};

// ---------------------------------------------------------------------------
// Wire timeline entry (snake_case)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub sequence_num: i32,
    #[serde(default)]
    pub step_index: Option<i32>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub action: Option<ActionDefinition>,
    #[serde(default)]
    pub context: Option<EventContext>,
    #[serde(default)]
    pub telemetry: Option<ActionTelemetry>,
}

/// Typed action with at most one populated parameter variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate: Option<NavigateParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click: Option<ClickParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover: Option<SelectorParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<SelectorParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur: Option<SelectorParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert: Option<AssertParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<SelectParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<ScrollParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<KeyboardParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag_drop: Option<DragDropParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluate: Option<EvaluateParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ActionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigateParams {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorParams {
    #[serde(default)]
    pub selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_page: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitParams {
    #[serde(default)]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyboardParams {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DragDropParams {
    #[serde(default)]
    pub source_selector: String,
    #[serde(default)]
    pub target_selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluateParams {
    #[serde(default)]
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector_candidates: Vec<SelectorCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_snapshot: Option<WireElementSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireElementSnapshot {
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
}

/// Where an event originated: a live recording session or an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    SessionId(String),
    ExecutionId(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<EventOrigin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTelemetry {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<Point>,
}

// ---------------------------------------------------------------------------
// Legacy recorded action (camelCase)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorCandidate {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub specificity: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSet {
    #[serde(default)]
    pub primary: String,
    #[serde(default)]
    pub candidates: Vec<SelectorCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMeta {
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
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedAction {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub sequence_num: i32,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SelectorSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_meta: Option<ElementMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, JsonValue>>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_pos: Option<Point>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert a wire entry into the legacy shape, using the current time when the
/// entry carries no timestamp.
pub fn to_recorded_action(entry: &TimelineEntry) -> RecordedAction {
    to_recorded_action_at(entry, Utc::now())
}

/// Deterministic conversion with an explicit fallback clock.
pub fn to_recorded_action_at(entry: &TimelineEntry, now: DateTime<Utc>) -> RecordedAction {
    let action = entry.action.as_ref();
    let metadata = action.and_then(|a| a.metadata.as_ref());

    let session_id = match entry.context.as_ref().and_then(|c| c.origin.as_ref()) {
        Some(EventOrigin::SessionId(id)) => id.clone(),
        _ => String::new(),
    };

    let primary = action.and_then(primary_selector).unwrap_or_default();
    let candidates = metadata
        .map(|m| m.selector_candidates.clone())
        .unwrap_or_default();
    let selector = if primary.is_empty() && candidates.is_empty() {
        None
    } else {
        Some(SelectorSet {
            primary,
            candidates,
        })
    };

    let navigate_url = action
        .and_then(|a| a.navigate.as_ref())
        .map(|n| n.url.clone())
        .filter(|u| !u.is_empty());
    let telemetry_url = entry
        .telemetry
        .as_ref()
        .map(|t| t.url.clone())
        .filter(|u| !u.is_empty());

    RecordedAction {
        id: entry.id.clone(),
        session_id,
        sequence_num: entry.sequence_num,
        timestamp: format_rfc3339_nano(entry.timestamp.unwrap_or(now)),
        duration_ms: entry.duration_ms,
        action_type: action
            .map(|a| action_type_name(&a.action_type))
            .unwrap_or_else(|| "unknown".to_string()),
        confidence: metadata.and_then(|m| m.confidence).unwrap_or(0.0),
        selector,
        element_meta: metadata
            .and_then(|m| m.element_snapshot.as_ref())
            .map(|e| ElementMeta {
                tag_name: e.tag_name.clone(),
                id: e.id.clone(),
                class_name: e.class_name.clone(),
                inner_text: e.inner_text.clone(),
                attributes: e.attributes.clone(),
                is_visible: e.is_visible,
                is_enabled: e.is_enabled,
                role: e.role.clone(),
                aria_label: e.aria_label.clone(),
            }),
        bounding_box: metadata.and_then(|m| m.bounding_box),
        payload: action.map(build_payload).filter(|p| !p.is_empty()),
        url: navigate_url.or(telemetry_url).unwrap_or_default(),
        frame_id: None,
        cursor_pos: entry.telemetry.as_ref().and_then(|t| t.cursor_position),
    }
}

/// Reconstruct a wire entry from a legacy action. Fields the legacy shape never
/// carried stay empty.
pub fn from_recorded_action(action: &RecordedAction) -> TimelineEntry {
    let action_type = action_type_name(&action.action_type);
    let payload = action.payload.clone().unwrap_or_default();
    let selector = action
        .selector
        .as_ref()
        .map(|s| s.primary.clone())
        .unwrap_or_default();

    let mut definition = ActionDefinition {
        action_type: action_type.clone(),
        ..Default::default()
    };

    let str_field = |key: &str| payload.get(key).and_then(JsonValue::as_str).map(str::to_string);
    let int_field = |key: &str| payload.get(key).and_then(JsonValue::as_i64);
    let bool_field = |key: &str| payload.get(key).and_then(JsonValue::as_bool);
    let list_field = |key: &str| {
        payload
            .get(key)
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    };

    match action_type.parse::<ActionType>() {
        Ok(ActionType::Navigate) => {
            definition.navigate = Some(NavigateParams {
                url: action.url.clone(),
                wait_for_selector: str_field("waitForSelector"),
                timeout_ms: int_field("timeoutMs"),
                wait_until: str_field("waitUntil"),
            })
        }
        Ok(ActionType::Click) => {
            definition.click = Some(ClickParams {
                selector,
                button: str_field("button"),
                modifiers: list_field("modifiers"),
                click_count: int_field("clickCount").map(|n| n as i32),
                delay: int_field("delay"),
            })
        }
        Ok(ActionType::Input) => {
            definition.input = Some(InputParams {
                selector,
                value: str_field("text").unwrap_or_default(),
                submit: bool_field("submit"),
                delay_ms: int_field("delayMs"),
            })
        }
        Ok(ActionType::Hover) => definition.hover = Some(SelectorParams { selector }),
        Ok(ActionType::Focus) => definition.focus = Some(SelectorParams { selector }),
        Ok(ActionType::Blur) => definition.blur = Some(SelectorParams { selector }),
        Ok(ActionType::Assert) => {
            definition.assert = Some(AssertParams {
                selector,
                mode: str_field("mode").unwrap_or_default(),
                expected: payload.get("expected").cloned(),
                negated: bool_field("negated"),
                case_sensitive: bool_field("caseSensitive"),
                attribute_name: str_field("attribute"),
            })
        }
        Ok(ActionType::Select) => {
            definition.select = Some(SelectParams {
                selector,
                value: str_field("value").unwrap_or_default(),
            })
        }
        Ok(ActionType::Scroll) => {
            definition.scroll = Some(ScrollParams {
                selector,
                x: int_field("scrollX"),
                y: int_field("scrollY"),
            })
        }
        Ok(ActionType::Screenshot) => {
            definition.screenshot = Some(ScreenshotParams {
                selector,
                full_page: bool_field("fullPage"),
                quality: int_field("quality").map(|n| n as i32),
            })
        }
        Ok(ActionType::Wait) => {
            definition.wait = Some(WaitParams {
                selector: str_field("waitForSelector").unwrap_or_default(),
                timeout_ms: int_field("timeoutMs"),
            })
        }
        Ok(ActionType::Keyboard) => {
            definition.keyboard = Some(KeyboardParams {
                key: str_field("key").unwrap_or_default(),
                modifiers: list_field("modifiers"),
            })
        }
        Ok(ActionType::DragDrop) => {
            definition.drag_drop = Some(DragDropParams {
                source_selector: selector,
                target_selector: str_field("targetSelector").unwrap_or_default(),
            })
        }
        _ => {}
    }

    let has_metadata = action.selector.as_ref().is_some_and(|s| !s.candidates.is_empty())
        || action.element_meta.is_some()
        || action.bounding_box.is_some()
        || action.confidence != 0.0;
    if has_metadata {
        definition.metadata = Some(ActionMetadata {
            label: None,
            selector_candidates: action
                .selector
                .as_ref()
                .map(|s| s.candidates.clone())
                .unwrap_or_default(),
            confidence: (action.confidence != 0.0).then_some(action.confidence),
            bounding_box: action.bounding_box,
            element_snapshot: action.element_meta.as_ref().map(|e| WireElementSnapshot {
                tag_name: e.tag_name.clone(),
                id: e.id.clone(),
                class_name: e.class_name.clone(),
                inner_text: e.inner_text.clone(),
                attributes: e.attributes.clone(),
                is_visible: e.is_visible,
                is_enabled: e.is_enabled,
                role: e.role.clone(),
                aria_label: e.aria_label.clone(),
            }),
        });
    }

    TimelineEntry {
        id: action.id.clone(),
        sequence_num: action.sequence_num,
        step_index: None,
        node_id: None,
        timestamp: DateTime::parse_from_rfc3339(&action.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        duration_ms: action.duration_ms,
        action: Some(definition),
        context: (!action.session_id.is_empty()).then(|| EventContext {
            origin: Some(EventOrigin::SessionId(action.session_id.clone())),
        }),
        telemetry: Some(ActionTelemetry {
            url: action.url.clone(),
            cursor_position: action.cursor_pos,
        }),
    }
}

/// Canonical camelCase name for a wire action type, tolerating the
/// `ACTION_TYPE_*` spelling and unknown values.
pub fn action_type_name(raw: &str) -> String {
    match raw.parse::<ActionType>() {
        Ok(action) => action.as_str().to_string(),
        Err(_) => {
            let trimmed = raw.trim();
            let stripped = trimmed.strip_prefix("ACTION_TYPE_").unwrap_or(trimmed);
            if stripped.is_empty() {
                "unknown".to_string()
            } else {
                stripped.to_lowercase()
            }
        }
    }
}

/// RFC3339 in UTC with nanoseconds, trailing fractional zeros trimmed.
pub fn format_rfc3339_nano(ts: DateTime<Utc>) -> String {
    let base = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos == 0 {
        return format!("{}Z", base);
    }
    let fraction = format!("{:09}", nanos);
    format!("{}.{}Z", base, fraction.trim_end_matches('0'))
}

fn primary_selector(action: &ActionDefinition) -> Option<String> {
    let selector = if let Some(p) = &action.click {
        &p.selector
    } else if let Some(p) = &action.input {
        &p.selector
    } else if let Some(p) = &action.hover {
        &p.selector
    } else if let Some(p) = &action.focus {
        &p.selector
    } else if let Some(p) = &action.assert {
        &p.selector
    } else if let Some(p) = &action.select {
        &p.selector
    } else if let Some(p) = &action.scroll {
        &p.selector
    } else if let Some(p) = &action.screenshot {
        &p.selector
    } else if let Some(p) = &action.blur {
        &p.selector
    } else {
        return None;
    };
    (!selector.is_empty()).then(|| selector.clone())
}

fn build_payload(action: &ActionDefinition) -> Map<String, JsonValue> {
    let mut payload = Map::new();
    let mut put = |key: &str, value: Option<JsonValue>| {
        if let Some(value) = value {
            payload.insert(key.to_string(), value);
        }
    };

    if let Some(p) = &action.click {
        put("button", p.button.clone().map(JsonValue::from));
        put(
            "modifiers",
            (!p.modifiers.is_empty()).then(|| JsonValue::from(p.modifiers.clone())),
        );
        put("clickCount", p.click_count.map(JsonValue::from));
        put("delay", p.delay.map(JsonValue::from));
    }
    if let Some(p) = &action.input {
        put("text", Some(JsonValue::from(p.value.clone())));
        put("submit", p.submit.map(JsonValue::from));
        put("delayMs", p.delay_ms.map(JsonValue::from));
    }
    if let Some(p) = &action.navigate {
        put("waitForSelector", p.wait_for_selector.clone().map(JsonValue::from));
        put("timeoutMs", p.timeout_ms.map(JsonValue::from));
        put("waitUntil", p.wait_until.clone().map(JsonValue::from));
    }
    if let Some(p) = &action.wait {
        put(
            "waitForSelector",
            (!p.selector.is_empty()).then(|| JsonValue::from(p.selector.clone())),
        );
        put("timeoutMs", p.timeout_ms.map(JsonValue::from));
    }
    if let Some(p) = &action.scroll {
        put("scrollX", p.x.map(JsonValue::from));
        put("scrollY", p.y.map(JsonValue::from));
    }
    if let Some(p) = &action.select {
        put("value", Some(JsonValue::from(p.value.clone())));
    }
    if let Some(p) = &action.keyboard {
        put("key", Some(JsonValue::from(p.key.clone())));
        put(
            "modifiers",
            (!p.modifiers.is_empty()).then(|| JsonValue::from(p.modifiers.clone())),
        );
    }
    if let Some(p) = &action.assert {
        put(
            "mode",
            (!p.mode.is_empty()).then(|| JsonValue::from(p.mode.clone())),
        );
        put("expected", p.expected.clone());
        put("negated", p.negated.map(JsonValue::from));
        put("caseSensitive", p.case_sensitive.map(JsonValue::from));
        put("attribute", p.attribute_name.clone().map(JsonValue::from));
    }
    if let Some(p) = &action.screenshot {
        put("fullPage", p.full_page.map(JsonValue::from));
        put("quality", p.quality.map(JsonValue::from));
    }
    if let Some(p) = &action.drag_drop {
        put(
            "targetSelector",
            (!p.target_selector.is_empty()).then(|| JsonValue::from(p.target_selector.clone())),
        );
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn click_entry() -> TimelineEntry {
        serde_json::from_value(json!({
            "id": "evt-1",
            "sequence_num": 3,
            "timestamp": "2024-05-01T10:00:00.120Z",
            "duration_ms": 42,
            "action": {
                "type": "ACTION_TYPE_CLICK",
                "click": {
                    "selector": "#submit",
                    "button": "left",
                    "modifiers": ["Shift"],
                    "click_count": 2,
                    "unlisted": "dropped"
                },
                "metadata": {
                    "selector_candidates": [
                        {"type": "css", "value": "#submit", "confidence": 0.9, "specificity": 100}
                    ],
                    "confidence": 0.9,
                    "bounding_box": {"x": 1.0, "y": 2.0, "width": 30.0, "height": 10.0},
                    "element_snapshot": {"tag_name": "BUTTON", "id": "submit", "is_visible": true}
                }
            },
            "context": {"origin": {"session_id": "sess-9"}},
            "telemetry": {"url": "https://example.com/form", "cursor_position": {"x": 5.0, "y": 6.0}}
        }))
        .unwrap()
    }

    #[test]
    fn test_click_entry_converts_to_legacy_action() {
        let action = to_recorded_action(&click_entry());

        assert_eq!(action.action_type, "click");
        assert_eq!(action.session_id, "sess-9");
        assert_eq!(action.timestamp, "2024-05-01T10:00:00.12Z");
        assert_eq!(action.duration_ms, Some(42));
        assert_eq!(action.selector.as_ref().unwrap().primary, "#submit");
        assert_eq!(action.selector.as_ref().unwrap().candidates.len(), 1);
        assert_eq!(action.element_meta.as_ref().unwrap().tag_name, "BUTTON");
        assert_eq!(action.url, "https://example.com/form");
        assert_eq!(action.cursor_pos, Some(Point { x: 5.0, y: 6.0 }));

        let payload = action.payload.unwrap();
        assert_eq!(payload.get("button"), Some(&json!("left")));
        assert_eq!(payload.get("modifiers"), Some(&json!(["Shift"])));
        assert_eq!(payload.get("clickCount"), Some(&json!(2)));
        assert!(!payload.contains_key("unlisted"));
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn test_conversion_is_deterministic_with_fixed_clock() {
        let mut entry = click_entry();
        entry.timestamp = None;
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let a = to_recorded_action_at(&entry, now);
        let b = to_recorded_action_at(&entry, now);
        assert_eq!(a, b);
        assert_eq!(a.timestamp, "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_navigate_url_wins_over_telemetry() {
        let entry: TimelineEntry = serde_json::from_value(json!({
            "id": "evt-2",
            "action": {
                "type": "navigate",
                "navigate": {"url": "https://target.test", "wait_until": "load", "timeout_ms": 5000}
            },
            "context": {"origin": {"execution_id": "exec-1"}},
            "telemetry": {"url": "https://previous.test"}
        }))
        .unwrap();

        let action = to_recorded_action(&entry);
        assert_eq!(action.url, "https://target.test");
        assert_eq!(action.session_id, "");
        assert!(action.selector.is_none());
        let payload = action.payload.unwrap();
        assert_eq!(payload.get("waitUntil"), Some(&json!("load")));
        assert_eq!(payload.get("timeoutMs"), Some(&json!(5000)));
    }

    #[test]
    fn test_unknown_action_type_is_kept_lowercase() {
        assert_eq!(action_type_name("ACTION_TYPE_TELEPORT"), "teleport");
        assert_eq!(action_type_name(""), "unknown");
        assert_eq!(action_type_name("ACTION_TYPE_DRAG_DROP"), "dragDrop");
    }

    #[test]
    fn test_format_rfc3339_nano_trims_zeros() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_500);
        assert_eq!(format_rfc3339_nano(ts), "2024-01-01T00:00:00.0000015Z");
    }

    #[test]
    fn test_legacy_action_converts_back_to_entry() {
        let legacy = to_recorded_action(&click_entry());
        let entry = from_recorded_action(&legacy);

        let definition = entry.action.as_ref().unwrap();
        assert_eq!(definition.action_type, "click");
        let click = definition.click.as_ref().unwrap();
        assert_eq!(click.selector, "#submit");
        assert_eq!(click.click_count, Some(2));
        assert_eq!(
            entry.context.unwrap().origin,
            Some(EventOrigin::SessionId("sess-9".to_string()))
        );

        let again = to_recorded_action(&from_recorded_action(&legacy));
        assert_eq!(again.payload, legacy.payload);
        assert_eq!(again.selector, legacy.selector);
    }
}
