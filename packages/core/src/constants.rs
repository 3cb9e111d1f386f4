// ABOUTME: Bounded-size limits and contract version markers
// ABOUTME: Caps applied to every step outcome before it is persisted

/// Schema identifier stamped on every step outcome.
pub const STEP_OUTCOME_SCHEMA_VERSION: &str = "automation-step-outcome-v1";

/// Version of the outcome payload layout.
pub const STEP_OUTCOME_PAYLOAD_VERSION: &str = "1";

/// Maximum number of screenshot bytes kept per step.
pub const SCREENSHOT_MAX_BYTES: usize = 512 * 1024;

/// Maximum number of DOM snapshot bytes kept per step.
pub const DOM_SNAPSHOT_MAX_BYTES: usize = 512 * 1024;

/// Maximum number of bytes kept for a single console entry.
pub const CONSOLE_ENTRY_MAX_BYTES: usize = 16 * 1024;

/// Maximum number of bytes kept for each request/response body preview.
pub const NETWORK_PAYLOAD_PREVIEW_MAX_BYTES: usize = 64 * 1024;

/// Maximum number of console entries retained per step.
/// Same value as [`CONSOLE_ENTRY_MAX_BYTES`], but an entry count, not a byte cap.
pub const MAX_CONSOLE_ENTRIES: usize = CONSOLE_ENTRY_MAX_BYTES;

/// Maximum number of network events retained per step.
pub const MAX_NETWORK_EVENTS: usize = NETWORK_PAYLOAD_PREVIEW_MAX_BYTES;

/// External engine files (trace, video, HAR) at or under this size are inlined.
pub const EMBEDDED_EXTERNAL_FILE_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Number of characters kept in DOM previews on timeline frames.
pub const DOM_PREVIEW_MAX_CHARS: usize = 256;

/// Fallback screenshot dimensions when the engine reports zero.
pub const DEFAULT_SCREENSHOT_WIDTH: u32 = 1280;
pub const DEFAULT_SCREENSHOT_HEIGHT: u32 = 720;

/// Media type assumed for screenshots without one.
pub const DEFAULT_SCREENSHOT_MEDIA_TYPE: &str = "image/png";
