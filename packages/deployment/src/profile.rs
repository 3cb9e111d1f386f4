// ABOUTME: Deployment profiles and their JSON file store
// ABOUTME: A profile selects a scenario, target platforms, dependency swaps and signing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{DeploymentError, Result};
use crate::signing::SigningConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub scenario: String,
    /// Deployment tiers, e.g. `desktop`.
    #[serde(default)]
    pub tiers: Vec<String>,
    /// Dependency name → replacement.
    #[serde(default)]
    pub swaps: BTreeMap<String, String>,
    /// Target platforms (`win`, `mac`, `linux`).
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Overrides analyzer detection when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl DeploymentProfile {
    pub fn new(id: impl Into<String>, scenario: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            scenario: scenario.into(),
            tiers: vec!["desktop".to_string()],
            swaps: BTreeMap::new(),
            targets: Vec::new(),
            signing: None,
            version: default_version(),
            dependencies: None,
        }
    }

    pub fn with_swap(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.swaps.insert(from.into(), to.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }
}

/// Profiles stored as `<dir>/<profileId>.json`.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, profile_id: &str) -> Result<PathBuf> {
        validate_profile_id(profile_id)?;
        Ok(self.dir.join(format!("{}.json", profile_id)))
    }

    pub fn load(&self, profile_id: &str) -> Result<DeploymentProfile> {
        let path = self.path_for(profile_id)?;
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeploymentError::ProfileNotFound(profile_id.to_string()))
            }
            Err(e) => return Err(DeploymentError::io(&path, e)),
        };
        let profile: DeploymentProfile = serde_json::from_str(&text)?;
        if profile.id != profile_id {
            return Err(DeploymentError::validation(format!(
                "profile file {} declares id {}",
                path.display(),
                profile.id
            )));
        }
        Ok(profile)
    }

    pub fn save(&self, profile: &DeploymentProfile) -> Result<PathBuf> {
        let path = self.path_for(&profile.id)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| DeploymentError::io(&self.dir, e))?;
        let mut body = serde_json::to_string_pretty(profile)?;
        body.push('\n');
        std::fs::write(&path, body).map_err(|e| DeploymentError::io(&path, e))?;
        Ok(path)
    }

    /// Profile ids, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DeploymentError::io(&self.dir, e)),
        };
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

fn validate_profile_id(profile_id: &str) -> Result<()> {
    let valid = !profile_id.is_empty()
        && profile_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !profile_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(DeploymentError::validation(format!(
            "invalid profile id: {:?}",
            profile_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_list() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles"));
        assert!(store.list().unwrap().is_empty());

        let profile = DeploymentProfile::new("desk-1", "picker-wheel").with_swap("postgres", "sqlite");
        store.save(&profile).unwrap();

        assert_eq!(store.load("desk-1").unwrap(), profile);
        assert_eq!(store.list().unwrap(), vec!["desk-1".to_string()]);
    }

    #[test]
    fn test_missing_and_invalid_ids() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        assert!(matches!(
            store.load("nope"),
            Err(DeploymentError::ProfileNotFound(_))
        ));
        assert!(matches!(
            store.load("../etc/passwd"),
            Err(DeploymentError::Validation { .. })
        ));
    }

    #[test]
    fn test_defaults_when_fields_absent() {
        let profile: DeploymentProfile =
            serde_json::from_str(r#"{"id": "p", "scenario": "s"}"#).unwrap();
        assert_eq!(profile.version, "1.0.0");
        assert!(profile.swaps.is_empty());
        assert!(profile.dependencies.is_none());
    }
}
