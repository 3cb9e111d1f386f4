// ABOUTME: Promotes RunInstruction wire responses into domain StepOutcome records
// ABOUTME: Decodes base64 screenshots, lifts DOM html/preview and copies artifact paths into notes

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use vrooli_core::{CompiledInstruction, DomSnapshot, Screenshot, StepOutcome};

use crate::error::{DriverError, Result};
use crate::wire::RunInstructionResponse;

pub const NOTE_TRACE_PATH: &str = "trace_path";
pub const NOTE_VIDEO_PATH: &str = "video_path";
pub const NOTE_HAR_PATH: &str = "har_path";

pub(crate) fn decode_run_instruction(
    op: &str,
    url: &str,
    instruction: &CompiledInstruction,
    response: RunInstructionResponse,
) -> Result<StepOutcome> {
    let raw = response
        .step_outcome
        .ok_or_else(|| DriverError::validation(op, url, "response is missing step_outcome"))?;

    let mut outcome: StepOutcome = serde_json::from_value(raw).map_err(|e| {
        DriverError::validation(op, url, "step_outcome could not be decoded").with_cause(e.to_string())
    })?;

    if outcome.node_id.is_empty() {
        outcome.node_id = instruction.node_id.clone();
    }
    if outcome.step_type.is_empty() {
        outcome.step_type = instruction.action_type.clone();
    }
    if outcome.attempt == 0 {
        outcome.attempt = 1;
    }
    if outcome.schema_version.is_empty() {
        outcome.schema_version = vrooli_core::constants::STEP_OUTCOME_SCHEMA_VERSION.to_string();
    }
    if outcome.payload_version.is_empty() {
        outcome.payload_version = vrooli_core::constants::STEP_OUTCOME_PAYLOAD_VERSION.to_string();
    }

    let captured_at = outcome.completed_at.unwrap_or_else(Utc::now);

    if let Some(encoded) = response.screenshot_base64.filter(|s| !s.is_empty()) {
        let data = STANDARD.decode(encoded.trim()).map_err(|e| {
            DriverError::validation(op, url, "screenshot_base64 is not valid base64")
                .with_cause(e.to_string())
        })?;
        outcome.screenshot = Some(Screenshot {
            data,
            media_type: response.screenshot_media_type.unwrap_or_default(),
            capture_time: Some(captured_at),
            width: response.screenshot_width.unwrap_or(0),
            height: response.screenshot_height.unwrap_or(0),
            hash: String::new(),
            from_cache: false,
            truncated: false,
            source: "driver".to_string(),
        });
    }

    let html = response.dom_html.unwrap_or_default();
    let preview = response.dom_preview.unwrap_or_default();
    if !html.is_empty() || !preview.is_empty() {
        outcome.dom_snapshot = Some(DomSnapshot {
            html,
            preview,
            hash: String::new(),
            collected_at: Some(captured_at),
            truncated: false,
        });
    }

    for (key, value) in [
        (NOTE_TRACE_PATH, response.trace_path),
        (NOTE_VIDEO_PATH, response.video_path),
        (NOTE_HAR_PATH, response.har_path),
    ] {
        if let Some(path) = value.filter(|p| !p.trim().is_empty()) {
            outcome.notes.insert(key.to_string(), path);
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vrooli_core::ActionType;

    fn click() -> CompiledInstruction {
        CompiledInstruction::new(0, "node-click", ActionType::Click)
    }

    #[test]
    fn test_decode_promotes_screenshot_dom_and_paths() {
        let response: RunInstructionResponse = serde_json::from_value(json!({
            "step_outcome": {
                "stepIndex": 0,
                "stepType": "click",
                "success": true,
                "startedAt": "2024-01-01T00:00:00Z",
                "completedAt": "2024-01-01T00:00:01Z",
                "durationMs": 1000
            },
            "screenshot_base64": STANDARD.encode([7u8; 32]),
            "screenshot_media_type": "image/jpeg",
            "dom_html": "<html></html>",
            "dom_preview": "<html>",
            "trace_path": "/tmp/trace.zip",
            "har_path": ""
        }))
        .unwrap();

        let outcome = decode_run_instruction("run instruction", "u", &click(), response).unwrap();

        assert_eq!(outcome.node_id, "node-click");
        let shot = outcome.screenshot.unwrap();
        assert_eq!(shot.data, vec![7u8; 32]);
        assert_eq!(shot.media_type, "image/jpeg");
        assert_eq!(outcome.dom_snapshot.unwrap().preview, "<html>");
        assert_eq!(outcome.notes.get(NOTE_TRACE_PATH).unwrap(), "/tmp/trace.zip");
        assert!(!outcome.notes.contains_key(NOTE_HAR_PATH));
    }

    #[test]
    fn test_decode_requires_step_outcome() {
        let err = decode_run_instruction("run instruction", "u", &click(), Default::default())
            .unwrap_err();
        assert!(err.message.contains("step_outcome"));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let response: RunInstructionResponse = serde_json::from_value(json!({
            "step_outcome": {"success": true, "startedAt": "2024-01-01T00:00:00Z"},
            "screenshot_base64": "%%%not-base64%%%"
        }))
        .unwrap();
        let err = decode_run_instruction("run instruction", "u", &click(), response).unwrap_err();
        assert!(err.message.contains("base64"));
    }
}
