// ABOUTME: Typed client for the remote browser driver
// ABOUTME: Session and recording operations, instruction dispatch and timeline conversion

pub mod client;
pub mod decode;
pub mod error;
pub mod timeline;
pub mod wire;

pub use client::{
    BrowserDriver, DriverClient, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_RECORDING_TIMEOUT,
};
pub use decode::{NOTE_HAR_PATH, NOTE_TRACE_PATH, NOTE_VIDEO_PATH};
pub use error::{DriverError, DriverErrorKind, Result};
pub use timeline::{
    from_recorded_action, to_recorded_action, to_recorded_action_at, RecordedAction,
    TimelineEntry,
};
pub use wire::{
    CapturedImage, CreateSessionRequest, HealthStatus, InputEvent, NavigateRequest,
    NavigateResponse, RecordedActions, RecordingState, ReplayPreviewRequest,
    ReplayPreviewResponse, ReuseMode, ScreenshotRequest, StartRecordingRequest,
    StreamSettingsRequest, StreamSettingsResponse, ValidateSelectorResponse, Viewport,
};
