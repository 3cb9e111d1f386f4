// ABOUTME: Core contracts shared across the execution substrate
// ABOUTME: Step outcomes, execution plans, action kinds, artifact limits and id helpers

pub mod constants;
pub mod types;
pub mod utils;

// Re-export main types
pub use types::{
    ActionType, AssertionOutcome, BoundingBox, CompiledInstruction, ConsoleLogEntry,
    CursorPosition, DomSnapshot, ElementFocus, ElementSnapshot, ExecutionPlan, FailureKind,
    HighlightRegion, MaskRegion, NetworkEvent, Point, Screenshot, StepFailure, StepOutcome,
    UnknownActionType,
};

// Re-export constants
pub use constants::{
    CONSOLE_ENTRY_MAX_BYTES, DOM_SNAPSHOT_MAX_BYTES, EMBEDDED_EXTERNAL_FILE_MAX_BYTES,
    MAX_CONSOLE_ENTRIES, MAX_NETWORK_EVENTS, NETWORK_PAYLOAD_PREVIEW_MAX_BYTES,
    SCREENSHOT_MAX_BYTES,
};

// Re-export utilities
pub use utils::{new_id, sha256_hex, short_id, truncate_chars, truncate_utf8};
