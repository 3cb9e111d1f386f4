// ABOUTME: Reading and monotone merging of a scenario's .vrooli/service.json
// ABOUTME: Existing entries and key order are preserved; detected entries are only ever added

use serde_json::{json, Map, Value as JsonValue};
use std::path::{Path, PathBuf};

use crate::error::{AnalyzerError, Result};
use crate::types::DetectedDependency;

pub const SERVICE_FILE: &str = ".vrooli/service.json";

const DEPENDENCIES_KEY: &str = "dependencies";
const RESOURCES_KEY: &str = "resources";
const SCENARIOS_KEY: &str = "scenarios";

pub fn service_file_path(scenario_root: &Path) -> PathBuf {
    scenario_root.join(SERVICE_FILE)
}

/// Parsed service.json. A missing file reads as an empty object.
pub fn load_service_config(path: &Path) -> Result<JsonValue> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(JsonValue::Object(Map::new()))
        }
        Err(e) => return Err(AnalyzerError::io(path, e)),
    };
    let value: JsonValue = serde_json::from_str(&text)?;
    if !value.is_object() {
        return Err(AnalyzerError::InvalidServiceFile {
            path: path.display().to_string(),
            message: "top level must be an object".to_string(),
        });
    }
    Ok(value)
}

/// Indent-2 rewrite through a sibling temp file.
pub fn write_service_config(path: &Path, config: &JsonValue) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AnalyzerError::io(parent, e))?;
    }
    let mut body = serde_json::to_string_pretty(config)?;
    body.push('\n');

    let temp = path.with_extension("json.tmp");
    std::fs::write(&temp, body).map_err(|e| AnalyzerError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        AnalyzerError::io(path, e)
    })
}

/// `service.version`, falling back to a top-level `version`.
pub fn service_version(config: &JsonValue) -> Option<String> {
    config
        .pointer("/service/version")
        .or_else(|| config.get("version"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

pub fn declared_resources(config: &JsonValue) -> Vec<String> {
    declared_keys(config, RESOURCES_KEY)
}

pub fn declared_scenarios(config: &JsonValue) -> Vec<String> {
    declared_keys(config, SCENARIOS_KEY)
}

fn declared_keys(config: &JsonValue, section: &str) -> Vec<String> {
    config
        .get(DEPENDENCIES_KEY)
        .and_then(|deps| deps.get(section))
        .and_then(JsonValue::as_object)
        .map(|entries| entries.keys().cloned().collect())
        .unwrap_or_default()
}

/// Insert each resource not yet declared. Returns the names added.
pub fn merge_resources(
    config: &mut JsonValue,
    path: &Path,
    detected: &[DetectedDependency],
) -> Result<Vec<String>> {
    let entries = section_mut(config, path, RESOURCES_KEY)?;
    let mut added = Vec::new();
    for dependency in detected {
        if entries.contains_key(&dependency.dependency_name) {
            continue;
        }
        entries.insert(
            dependency.dependency_name.clone(),
            json!({
                "type": dependency.dependency_name,
                "enabled": true,
                "required": dependency.required,
                "accessMethod": dependency.access_method.as_str(),
            }),
        );
        added.push(dependency.dependency_name.clone());
    }
    Ok(added)
}

/// Insert each scenario not yet declared, pinning `versionRange` to `>=version`
/// when the dependency's version is known. Returns the names added.
pub fn merge_scenarios(
    config: &mut JsonValue,
    path: &Path,
    detected: &[DetectedDependency],
) -> Result<Vec<String>> {
    let entries = section_mut(config, path, SCENARIOS_KEY)?;
    let mut added = Vec::new();
    for dependency in detected {
        if entries.contains_key(&dependency.dependency_name) {
            continue;
        }
        let mut entry = Map::new();
        entry.insert("required".into(), json!(dependency.required));
        entry.insert(
            "accessMethod".into(),
            json!(dependency.access_method.as_str()),
        );
        if let Some(version) = &dependency.version {
            entry.insert("version".into(), json!(version));
            entry.insert("versionRange".into(), json!(format!(">={}", version)));
        }
        entries.insert(dependency.dependency_name.clone(), JsonValue::Object(entry));
        added.push(dependency.dependency_name.clone());
    }
    Ok(added)
}

/// `dependencies.<section>`, created when absent. A non-object in the way is an error.
fn section_mut<'a>(
    config: &'a mut JsonValue,
    path: &Path,
    section: &str,
) -> Result<&'a mut Map<String, JsonValue>> {
    let invalid = |message: String| AnalyzerError::InvalidServiceFile {
        path: path.display().to_string(),
        message,
    };

    let root = config
        .as_object_mut()
        .ok_or_else(|| invalid("top level must be an object".to_string()))?;
    let deps = root
        .entry(DEPENDENCIES_KEY)
        .or_insert_with(|| JsonValue::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| invalid(format!("`{}` must be an object", DEPENDENCIES_KEY)))?;
    deps.entry(section)
        .or_insert_with(|| JsonValue::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| invalid(format!("`{}.{}` must be an object", DEPENDENCIES_KEY, section)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessMethod, DependencyType};
    use pretty_assertions::assert_eq;

    fn resource(name: &str) -> DetectedDependency {
        DetectedDependency::new(name, DependencyType::Resource, AccessMethod::Env)
    }

    #[test]
    fn test_merge_preserves_existing_entries_and_order() {
        let mut config: JsonValue = serde_json::from_str(
            r#"{
  "service": {"name": "me", "version": "1.0.0"},
  "dependencies": {
    "resources": {
      "redis": {"type": "redis", "enabled": false, "required": false},
      "minio": {"type": "minio", "enabled": true}
    }
  },
  "lifecycle": {}
}"#,
        )
        .unwrap();

        let added = merge_resources(
            &mut config,
            Path::new("service.json"),
            &[resource("redis"), resource("postgres")],
        )
        .unwrap();
        assert_eq!(added, vec!["postgres".to_string()]);

        let resources = config["dependencies"]["resources"].as_object().unwrap();
        let keys: Vec<&String> = resources.keys().collect();
        assert_eq!(keys, vec!["redis", "minio", "postgres"]);
        assert_eq!(resources["redis"]["enabled"], false);
        assert_eq!(resources["postgres"]["accessMethod"], "env");

        let top: Vec<&String> = config.as_object().unwrap().keys().collect();
        assert_eq!(top, vec!["service", "dependencies", "lifecycle"]);
    }

    #[test]
    fn test_merge_scenarios_sets_version_range() {
        let mut config = json!({});
        let mut dependency =
            DetectedDependency::new("app-monitor", DependencyType::Scenario, AccessMethod::VrooliCli);
        dependency.version = Some("2.1.0".into());

        merge_scenarios(&mut config, Path::new("service.json"), &[dependency]).unwrap();
        let entry = &config["dependencies"]["scenarios"]["app-monitor"];
        assert_eq!(entry["version"], "2.1.0");
        assert_eq!(entry["versionRange"], ">=2.1.0");
    }

    #[test]
    fn test_non_object_section_is_rejected() {
        let mut config = json!({"dependencies": {"resources": ["redis"]}});
        let err = merge_resources(&mut config, Path::new("service.json"), &[resource("redis")])
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidServiceFile { .. }));
    }

    #[test]
    fn test_service_version() {
        assert_eq!(
            service_version(&json!({"service": {"version": "3.0.0"}})),
            Some("3.0.0".to_string())
        );
        assert_eq!(
            service_version(&json!({"version": "0.1.0"})),
            Some("0.1.0".to_string())
        );
        assert_eq!(service_version(&json!({})), None);
    }
}
