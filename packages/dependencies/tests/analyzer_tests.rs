// ABOUTME: Integration tests for analyzing scenario trees and applying detected dependencies
// ABOUTME: Verifies diffs, version propagation and that merges never drop declared entries

use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use vrooli_dependencies::{DependencyAnalyzer, DependencyType, SERVICE_FILE};

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn scenarios() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(
        root,
        "picker-wheel/.vrooli/service.json",
        r#"{
  "service": {"name": "picker-wheel", "version": "1.0.0"},
  "dependencies": {
    "resources": {
      "minio": {"type": "minio", "enabled": true, "required": false}
    }
  }
}
"#,
    );
    write(
        root,
        "picker-wheel/api/main.go",
        r#"package main
func main() {
    db := os.Getenv("POSTGRES_URL")
    _ = exec.Command("vrooli", "scenario", "status", "app-monitor")
    run("vrooli scenario run app-monitor")
    log.Println("supported: n8n")
}
"#,
    );
    write(root, "picker-wheel/cli/install.sh", "resource-redis status\n");
    write(
        root,
        "app-monitor/.vrooli/service.json",
        r#"{"service": {"name": "app-monitor", "version": "2.3.0"}}"#,
    );
    dir
}

#[test]
fn test_analyze_reports_missing_and_unused() {
    let dir = scenarios();
    let analyzer = DependencyAnalyzer::new(dir.path()).unwrap();
    assert_eq!(
        analyzer.known_scenarios().unwrap(),
        vec!["app-monitor".to_string(), "picker-wheel".to_string()]
    );

    let analysis = analyzer.analyze("picker-wheel").unwrap();
    assert_eq!(
        analysis.detected_names(DependencyType::Resource),
        vec!["postgres", "redis"]
    );
    assert_eq!(
        analysis.detected_names(DependencyType::Scenario),
        vec!["app-monitor"]
    );
    assert_eq!(analysis.missing_resources.len(), 2);
    assert_eq!(analysis.unused_resources, vec!["minio".to_string()]);
    assert_eq!(
        analysis.missing_scenarios[0].version.as_deref(),
        Some("2.3.0")
    );
    assert!(analysis.has_drift());
}

#[test]
fn test_apply_is_monotone_and_idempotent() {
    let dir = scenarios();
    let analyzer = DependencyAnalyzer::new(dir.path()).unwrap();
    let analysis = analyzer.analyze("picker-wheel").unwrap();

    let report = analyzer
        .apply_detected_diffs("picker-wheel", &analysis, true, true)
        .unwrap();
    assert!(report.written);
    assert_eq!(
        report.added_resources,
        vec!["postgres".to_string(), "redis".to_string()]
    );
    assert_eq!(report.added_scenarios, vec!["app-monitor".to_string()]);

    let path = dir.path().join("picker-wheel").join(SERVICE_FILE);
    let config: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let resources: Vec<&String> = config["dependencies"]["resources"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(resources, vec!["minio", "postgres", "redis"]);
    assert_eq!(config["dependencies"]["resources"]["minio"]["required"], false);
    assert_eq!(
        config["dependencies"]["scenarios"]["app-monitor"]["versionRange"],
        ">=2.3.0"
    );

    let again = analyzer.analyze("picker-wheel").unwrap();
    assert!(!again.has_drift());
    let report = analyzer
        .apply_detected_diffs("picker-wheel", &again, true, true)
        .unwrap();
    assert!(!report.written);
}

#[test]
fn test_apply_respects_write_flags() {
    let dir = scenarios();
    let analyzer = DependencyAnalyzer::new(dir.path()).unwrap();
    let analysis = analyzer.analyze("picker-wheel").unwrap();

    let report = analyzer
        .apply_detected_diffs("picker-wheel", &analysis, false, true)
        .unwrap();
    assert!(report.added_resources.is_empty());
    assert_eq!(report.added_scenarios, vec!["app-monitor".to_string()]);

    let after = analyzer.analyze("picker-wheel").unwrap();
    assert_eq!(after.missing_resources.len(), 2);
    assert!(after.missing_scenarios.is_empty());
}

#[test]
fn test_unknown_scenario() {
    let dir = scenarios();
    let analyzer = DependencyAnalyzer::new(dir.path()).unwrap();
    assert!(analyzer.analyze("nope").is_err());
    assert!(analyzer.analyze("../picker-wheel").is_err());
}

#[test]
fn test_scenario_name_must_stay_inside_scenarios_dir() {
    let dir = scenarios();
    let analyzer = DependencyAnalyzer::new(dir.path().join("picker-wheel")).unwrap();
    for name in ["", ".", "..", "api/..", "..\\picker-wheel", "/tmp"] {
        assert!(analyzer.analyze(name).is_err(), "accepted {:?}", name);
    }
    assert!(DependencyAnalyzer::new(dir.path()).unwrap().analyze("picker-wheel").is_ok());
}
