// ABOUTME: Pure clamps applied to every step outcome before persistence
// ABOUTME: Bounds screenshot, DOM, console and network payloads and hashes what was cut

use vrooli_core::constants::{
    CONSOLE_ENTRY_MAX_BYTES, DEFAULT_SCREENSHOT_HEIGHT, DEFAULT_SCREENSHOT_MEDIA_TYPE,
    DEFAULT_SCREENSHOT_WIDTH, DOM_SNAPSHOT_MAX_BYTES, MAX_CONSOLE_ENTRIES, MAX_NETWORK_EVENTS,
    NETWORK_PAYLOAD_PREVIEW_MAX_BYTES, SCREENSHOT_MAX_BYTES,
};
use vrooli_core::{
    sha256_hex, truncate_utf8, ConsoleLogEntry, DomSnapshot, NetworkEvent, Screenshot,
    StepOutcome,
};

pub const NOTE_SCREENSHOT_TRUNCATED: &str = "screenshot_truncated";
pub const NOTE_DOM_TRUNCATED_HASH: &str = "dom_truncated_hash";
pub const TRUNCATED_MARKER: &str = "[truncated]";

/// Apply every clamp. Running it twice yields the same outcome as running it once.
pub fn sanitize_outcome(mut outcome: StepOutcome) -> StepOutcome {
    if let Some(screenshot) = outcome.screenshot.as_mut() {
        if let Some(original_len) = sanitize_screenshot(screenshot) {
            outcome.notes.insert(
                NOTE_SCREENSHOT_TRUNCATED.to_string(),
                format!("{}_bytes", original_len),
            );
        }
    }

    if let Some(dom) = outcome.dom_snapshot.as_mut() {
        if let Some(hash) = sanitize_dom(dom) {
            outcome
                .notes
                .insert(NOTE_DOM_TRUNCATED_HASH.to_string(), hash);
        }
    }

    outcome.console_logs = sanitize_console(std::mem::take(&mut outcome.console_logs));
    outcome.network = sanitize_network(std::mem::take(&mut outcome.network));
    outcome
}

/// Clamp screenshot bytes and fill defaults. Returns the original length when truncated.
pub fn sanitize_screenshot(screenshot: &mut Screenshot) -> Option<usize> {
    let mut truncated_from = None;
    if screenshot.data.len() > SCREENSHOT_MAX_BYTES {
        truncated_from = Some(screenshot.data.len());
        screenshot.data.truncate(SCREENSHOT_MAX_BYTES);
        screenshot.truncated = true;
    }
    if screenshot.media_type.trim().is_empty() {
        screenshot.media_type = DEFAULT_SCREENSHOT_MEDIA_TYPE.to_string();
    }
    if screenshot.width == 0 {
        screenshot.width = DEFAULT_SCREENSHOT_WIDTH;
    }
    if screenshot.height == 0 {
        screenshot.height = DEFAULT_SCREENSHOT_HEIGHT;
    }
    truncated_from
}

/// Clamp DOM html. Returns the SHA-256 of the original html when truncated.
pub fn sanitize_dom(dom: &mut DomSnapshot) -> Option<String> {
    if dom.html.len() <= DOM_SNAPSHOT_MAX_BYTES {
        return None;
    }
    let hash = sha256_hex(dom.html.as_bytes());
    let keep = truncate_utf8(&dom.html, DOM_SNAPSHOT_MAX_BYTES).len();
    dom.html.truncate(keep);
    dom.truncated = true;
    dom.hash = hash.clone();
    Some(hash)
}

pub fn sanitize_console(entries: Vec<ConsoleLogEntry>) -> Vec<ConsoleLogEntry> {
    entries
        .into_iter()
        .take(MAX_CONSOLE_ENTRIES)
        .map(|mut entry| {
            if entry.text.len() > CONSOLE_ENTRY_MAX_BYTES {
                let hash = sha256_hex(entry.text.as_bytes());
                // Marker fits inside the cap
                let budget = CONSOLE_ENTRY_MAX_BYTES - TRUNCATED_MARKER.len();
                let keep = truncate_utf8(&entry.text, budget).len();
                entry.text.truncate(keep);
                entry.text.push_str(TRUNCATED_MARKER);
                entry.location = if entry.location.is_empty() {
                    format!("hash:{}", hash)
                } else {
                    format!("{} hash:{}", entry.location, hash)
                };
            }
            entry
        })
        .collect()
}

pub fn sanitize_network(events: Vec<NetworkEvent>) -> Vec<NetworkEvent> {
    events
        .into_iter()
        .take(MAX_NETWORK_EVENTS)
        .map(|mut event| {
            let request_cut = clamp_in_place(&mut event.request_body_preview);
            let response_cut = clamp_in_place(&mut event.response_body_preview);
            if request_cut || response_cut {
                event.truncated = true;
            }
            event
        })
        .collect()
}

fn clamp_in_place(text: &mut String) -> bool {
    if text.len() <= NETWORK_PAYLOAD_PREVIEW_MAX_BYTES {
        return false;
    }
    let keep = truncate_utf8(text, NETWORK_PAYLOAD_PREVIEW_MAX_BYTES).len();
    text.truncate(keep);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn screenshot(len: usize) -> Screenshot {
        Screenshot {
            data: vec![1u8; len],
            media_type: String::new(),
            capture_time: None,
            width: 0,
            height: 0,
            hash: String::new(),
            from_cache: false,
            truncated: false,
            source: String::new(),
        }
    }

    fn console(text: String, location: &str) -> ConsoleLogEntry {
        ConsoleLogEntry {
            kind: "log".to_string(),
            text,
            timestamp: Utc::now(),
            stack: None,
            location: location.to_string(),
        }
    }

    fn network(body: String) -> NetworkEvent {
        NetworkEvent {
            kind: "response".to_string(),
            url: "https://api.test".to_string(),
            method: "GET".to_string(),
            resource_type: "fetch".to_string(),
            status: Some(200),
            ok: Some(true),
            failure: None,
            timestamp: Utc::now(),
            request_headers: Default::default(),
            response_headers: Default::default(),
            request_body_preview: String::new(),
            response_body_preview: body,
            truncated: false,
        }
    }

    #[test]
    fn test_screenshot_at_limit_is_kept() {
        let mut outcome = StepOutcome::new(0, "n", "screenshot");
        outcome.screenshot = Some(screenshot(SCREENSHOT_MAX_BYTES));
        let outcome = sanitize_outcome(outcome);
        let shot = outcome.screenshot.unwrap();
        assert_eq!(shot.data.len(), SCREENSHOT_MAX_BYTES);
        assert!(!shot.truncated);
        assert!(!outcome.notes.contains_key(NOTE_SCREENSHOT_TRUNCATED));
        assert_eq!(shot.media_type, "image/png");
        assert_eq!((shot.width, shot.height), (1280, 720));
    }

    #[test]
    fn test_screenshot_over_limit_is_truncated() {
        let mut outcome = StepOutcome::new(0, "n", "screenshot");
        outcome.screenshot = Some(screenshot(SCREENSHOT_MAX_BYTES + 1));
        let outcome = sanitize_outcome(outcome);
        assert_eq!(outcome.screenshot.unwrap().data.len(), SCREENSHOT_MAX_BYTES);
        assert_eq!(
            outcome.notes.get(NOTE_SCREENSHOT_TRUNCATED).unwrap(),
            &format!("{}_bytes", SCREENSHOT_MAX_BYTES + 1)
        );
    }

    #[test]
    fn test_oversized_dom_records_hash_of_original() {
        let html = "a".repeat(DOM_SNAPSHOT_MAX_BYTES + 10);
        let expected_hash = sha256_hex(html.as_bytes());
        let mut outcome = StepOutcome::new(0, "n", "click");
        outcome.dom_snapshot = Some(DomSnapshot {
            html,
            ..Default::default()
        });

        let outcome = sanitize_outcome(outcome);
        let dom = outcome.dom_snapshot.unwrap();
        assert_eq!(dom.html.len(), DOM_SNAPSHOT_MAX_BYTES);
        assert!(dom.truncated);
        assert_eq!(dom.hash, expected_hash);
        assert_eq!(outcome.notes.get(NOTE_DOM_TRUNCATED_HASH), Some(&expected_hash));
    }

    #[test]
    fn test_long_console_entry_is_marked_and_hashed() {
        let mut outcome = StepOutcome::new(0, "n", "click");
        outcome.console_logs = vec![
            console("x".repeat(CONSOLE_ENTRY_MAX_BYTES * 2), "app.js:10"),
            console("y".repeat(CONSOLE_ENTRY_MAX_BYTES + 1), ""),
            console("short".to_string(), "app.js:1"),
        ];

        let outcome = sanitize_outcome(outcome);
        let logs = &outcome.console_logs;
        assert!(logs[0].text.ends_with(TRUNCATED_MARKER));
        assert!(logs[0].text.len() <= CONSOLE_ENTRY_MAX_BYTES);
        assert!(logs[0].location.starts_with("app.js:10 hash:"));
        assert!(logs[1].location.starts_with("hash:"));
        assert_eq!(logs[2].text, "short");
        assert_eq!(logs[2].location, "app.js:1");
    }

    #[test]
    fn test_console_entry_count_is_bounded() {
        let mut outcome = StepOutcome::new(0, "n", "click");
        outcome.console_logs = (0..MAX_CONSOLE_ENTRIES + 5)
            .map(|i| console(i.to_string(), ""))
            .collect();
        let outcome = sanitize_outcome(outcome);
        assert_eq!(outcome.console_logs.len(), MAX_CONSOLE_ENTRIES);
    }

    #[test]
    fn test_network_previews_are_clamped() {
        let mut outcome = StepOutcome::new(0, "n", "click");
        outcome.network = vec![
            network("z".repeat(NETWORK_PAYLOAD_PREVIEW_MAX_BYTES + 100)),
            network("ok".to_string()),
        ];
        let outcome = sanitize_outcome(outcome);
        assert_eq!(
            outcome.network[0].response_body_preview.len(),
            NETWORK_PAYLOAD_PREVIEW_MAX_BYTES
        );
        assert!(outcome.network[0].truncated);
        assert!(!outcome.network[1].truncated);
    }

    #[test]
    fn test_timestamps_are_utc() {
        let offset = FixedOffset::east_opt(5 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut entry = console("hi".to_string(), "");
        entry.timestamp = local.with_timezone(&Utc);
        let sanitized = sanitize_console(vec![entry]);
        assert_eq!(sanitized[0].timestamp.to_rfc3339(), "2024-01-01T07:00:00+00:00");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let mut outcome = StepOutcome::new(3, "n", "click");
        outcome.screenshot = Some(screenshot(SCREENSHOT_MAX_BYTES + 50));
        outcome.dom_snapshot = Some(DomSnapshot {
            html: "é".repeat(DOM_SNAPSHOT_MAX_BYTES),
            ..Default::default()
        });
        outcome.console_logs = vec![console("c".repeat(CONSOLE_ENTRY_MAX_BYTES + 3), "x")];
        outcome.network = vec![network("n".repeat(NETWORK_PAYLOAD_PREVIEW_MAX_BYTES + 3))];

        let once = sanitize_outcome(outcome);
        let twice = sanitize_outcome(once.clone());
        assert_eq!(once, twice);
    }
}
