// ABOUTME: Dependency analyzer over a scenarios directory
// ABOUTME: Diffs detected references against declared service.json entries and applies missing ones

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AnalyzerError, Result};
use crate::scanner::DependencyScanner;
use crate::service::{
    declared_resources, declared_scenarios, load_service_config, merge_resources,
    merge_scenarios, service_file_path, service_version, write_service_config,
};
use crate::types::{ApplyReport, DependencyType, DetectedDependency, ScenarioAnalysis};

pub struct DependencyAnalyzer {
    scenarios_dir: PathBuf,
    scanner: DependencyScanner,
}

impl DependencyAnalyzer {
    /// Every subdirectory of `scenarios_dir` is a known scenario.
    pub fn new(scenarios_dir: impl Into<PathBuf>) -> Result<Self> {
        let scenarios_dir = scenarios_dir.into();
        let known = list_scenarios(&scenarios_dir)?;
        Ok(Self {
            scanner: DependencyScanner::new(known)?,
            scenarios_dir,
        })
    }

    pub fn with_scanner(scenarios_dir: impl Into<PathBuf>, scanner: DependencyScanner) -> Self {
        Self {
            scenarios_dir: scenarios_dir.into(),
            scanner,
        }
    }

    pub fn scenarios_dir(&self) -> &Path {
        &self.scenarios_dir
    }

    pub fn scenario_path(&self, scenario: &str) -> PathBuf {
        self.scenarios_dir.join(scenario)
    }

    pub fn known_scenarios(&self) -> Result<Vec<String>> {
        list_scenarios(&self.scenarios_dir)
    }

    /// Scan one scenario and diff the result against its declarations.
    pub fn analyze(&self, scenario: &str) -> Result<ScenarioAnalysis> {
        let root = self.scenario_root(scenario)?;
        let mut detected = self.scanner.scan(scenario, &root)?;

        for dependency in detected
            .iter_mut()
            .filter(|d| d.dependency_type == DependencyType::Scenario)
        {
            let config = load_service_config(&service_file_path(
                &self.scenario_path(&dependency.dependency_name),
            ));
            // An unreadable dependency manifest just leaves the version unknown
            dependency.version = config.ok().as_ref().and_then(service_version);
        }

        let config = load_service_config(&service_file_path(&root))?;
        let analysis = diff(
            scenario,
            detected,
            declared_resources(&config),
            declared_scenarios(&config),
        );

        debug!(
            scenario = %scenario,
            detected = analysis.detected.len(),
            missing_resources = analysis.missing_resources.len(),
            missing_scenarios = analysis.missing_scenarios.len(),
            "Analyzed scenario dependencies"
        );
        Ok(analysis)
    }

    pub fn analyze_all(&self) -> Result<Vec<ScenarioAnalysis>> {
        self.known_scenarios()?
            .iter()
            .map(|scenario| self.analyze(scenario))
            .collect()
    }

    /// Add missing detected entries to service.json. Never removes or rewrites
    /// an existing entry; the file is only written when something was added.
    pub fn apply_detected_diffs(
        &self,
        scenario: &str,
        analysis: &ScenarioAnalysis,
        write_resources: bool,
        write_scenarios: bool,
    ) -> Result<ApplyReport> {
        let root = self.scenario_root(scenario)?;
        let path = service_file_path(&root);
        let mut config = load_service_config(&path)?;

        let mut report = ApplyReport::default();
        if write_resources {
            report.added_resources = merge_resources(&mut config, &path, &analysis.missing_resources)?;
        }
        if write_scenarios {
            report.added_scenarios = merge_scenarios(&mut config, &path, &analysis.missing_scenarios)?;
        }

        if report.added_resources.is_empty() && report.added_scenarios.is_empty() {
            return Ok(report);
        }

        write_service_config(&path, &config)?;
        report.written = true;
        info!(
            scenario = %scenario,
            resources = ?report.added_resources,
            scenarios = ?report.added_scenarios,
            "Applied detected dependencies"
        );
        Ok(report)
    }

    fn scenario_root(&self, scenario: &str) -> Result<PathBuf> {
        let mut components = Path::new(scenario).components();
        let single_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        let root = self.scenario_path(scenario);
        if !single_name || scenario.contains(['/', '\\']) || !root.is_dir() {
            return Err(AnalyzerError::ScenarioNotFound(scenario.to_string()));
        }
        Ok(root)
    }
}

/// Split detected dependencies into missing and declared-but-unused sets.
pub fn diff(
    scenario: &str,
    detected: Vec<DetectedDependency>,
    declared_resources: Vec<String>,
    declared_scenarios: Vec<String>,
) -> ScenarioAnalysis {
    let missing = |kind: DependencyType, declared: &[String]| -> Vec<DetectedDependency> {
        detected
            .iter()
            .filter(|d| d.dependency_type == kind && !declared.contains(&d.dependency_name))
            .cloned()
            .collect()
    };
    let unused = |kind: DependencyType, declared: &[String]| -> Vec<String> {
        let found: BTreeSet<&str> = detected
            .iter()
            .filter(|d| d.dependency_type == kind)
            .map(|d| d.dependency_name.as_str())
            .collect();
        declared
            .iter()
            .filter(|name| !found.contains(name.as_str()))
            .cloned()
            .collect()
    };

    ScenarioAnalysis {
        scenario: scenario.to_string(),
        missing_resources: missing(DependencyType::Resource, &declared_resources),
        missing_scenarios: missing(DependencyType::Scenario, &declared_scenarios),
        unused_resources: unused(DependencyType::Resource, &declared_resources),
        unused_scenarios: unused(DependencyType::Scenario, &declared_scenarios),
        declared_resources,
        declared_scenarios,
        detected,
    }
}

fn list_scenarios(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AnalyzerError::io(dir, e)),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}
