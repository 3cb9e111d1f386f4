// ABOUTME: Scenario dependency analyzer: source scanning, declared-vs-detected diffs and merges
// ABOUTME: Merges into .vrooli/service.json are monotone and preserve existing key order

pub mod analyzer;
pub mod error;
pub mod scanner;
pub mod service;
pub mod types;

pub use analyzer::{diff, DependencyAnalyzer};
pub use error::{AnalyzerError, Result};
pub use scanner::{DependencyScanner, KNOWN_RESOURCES};
pub use service::{load_service_config, write_service_config, SERVICE_FILE};
pub use types::{
    AccessMethod, ApplyReport, DependencyType, DetectedDependency, ScenarioAnalysis,
};
