// ABOUTME: Durable execution records and the workflow executor
// ABOUTME: Sanitizes step outcomes, writes result bundles and timelines, drives driver sessions

pub mod artifacts;
pub mod error;
pub mod executor;
pub mod sanitizer;
pub mod storage;
pub mod types;
pub mod writer;

pub use artifacts::{ArtifactStorage, FilesystemArtifactStorage, StoredObject};
pub use error::{
    ExecutorError, ExecutorResult, IndexError, IndexResult, WriterError, WriterResult,
};
pub use executor::{
    ExecutionReport, ExecutionRequest, WorkflowExecutor, WorkflowRunner,
    DEFAULT_TELEMETRY_INTERVAL,
};
pub use sanitizer::sanitize_outcome;
pub use storage::{ExecutionIndex, SqliteExecutionIndex};
pub use types::{
    ArtifactData, ArtifactType, BundleSummary, ExecutionRecord, ExecutionStatus, LogLevel,
    ProtoTimeline, ProtoTimelineEntry, RecordResult, ResultBundle, StepResultData, StepStatus,
    StepTelemetry, TelemetryEntry, TelemetryKind, TimelineFrameData, TimelineLog,
};
pub use writer::{ExecutionWriter, WriterConfig, RESULT_FILE, TIMELINE_FILE};
