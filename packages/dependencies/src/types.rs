// ABOUTME: Detected dependency records, per-scenario analysis results and apply reports
// ABOUTME: Serialized in camelCase to match service.json and API consumers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Resource,
    Scenario,
    Workflow,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Scenario => "scenario",
            Self::Workflow => "workflow",
        }
    }
}

/// How a dependency was reached from the scanned source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMethod {
    Env,
    ResourceCli,
    VrooliCli,
    PortResolver,
    File,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::ResourceCli => "resource-cli",
            Self::VrooliCli => "vrooli-cli",
            Self::PortResolver => "port-resolver",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedDependency {
    pub dependency_name: String,
    pub dependency_type: DependencyType,
    pub required: bool,
    pub access_method: AccessMethod,
    #[serde(default)]
    pub configuration: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// First file the reference was found in, relative to the scenario root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl DetectedDependency {
    pub fn new(
        name: impl Into<String>,
        dependency_type: DependencyType,
        access_method: AccessMethod,
    ) -> Self {
        Self {
            dependency_name: name.into(),
            dependency_type,
            required: true,
            access_method,
            configuration: Map::new(),
            version: None,
            source_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioAnalysis {
    pub scenario: String,
    pub detected: Vec<DetectedDependency>,
    pub declared_resources: Vec<String>,
    pub declared_scenarios: Vec<String>,
    /// Detected but not declared.
    pub missing_resources: Vec<DetectedDependency>,
    pub missing_scenarios: Vec<DetectedDependency>,
    /// Declared but not detected. Reported only; never removed.
    pub unused_resources: Vec<String>,
    pub unused_scenarios: Vec<String>,
}

impl ScenarioAnalysis {
    pub fn detected_names(&self, dependency_type: DependencyType) -> Vec<&str> {
        self.detected
            .iter()
            .filter(|d| d.dependency_type == dependency_type)
            .map(|d| d.dependency_name.as_str())
            .collect()
    }

    pub fn has_drift(&self) -> bool {
        !self.missing_resources.is_empty() || !self.missing_scenarios.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub added_resources: Vec<String>,
    pub added_scenarios: Vec<String>,
    /// Whether service.json was rewritten.
    pub written: bool,
}
