// ABOUTME: Bundle manifest assembly, export and post-build binary path rewriting
// ABOUTME: Exported manifests live at <output>/<scenario>/bundle.json

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{DeploymentError, Result};
use crate::profile::DeploymentProfile;
use crate::signing::SigningConfig;

pub const MANIFEST_SCHEMA_VERSION: &str = "1.0";
pub const MANIFEST_FILE: &str = "bundle.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub schema_version: String,
    pub scenario: String,
    pub profile_id: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub swaps: Vec<SwapEntry>,
    /// Resolved dependency names after swaps, sorted.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: String,
    pub kind: String,
    /// Platform → binary path.
    #[serde(default)]
    pub binaries: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub source_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEntry {
    pub from: String,
    pub to: String,
}

/// Default binary location for a service on a platform, relative to the scenario.
fn default_binary(service_id: &str, platform: &str) -> String {
    let suffix = if platform == "win" { ".exe" } else { "" };
    format!("bin/{}/{}{}", platform, service_id, suffix)
}

/// Build the manifest for `profile` given the dependencies it was validated with.
/// The signing block is left to the caller.
pub fn assemble_manifest(profile: &DeploymentProfile, detected: &[String]) -> BundleManifest {
    let service_id = format!("{}-api", profile.scenario);
    let binaries = profile
        .targets
        .iter()
        .map(|platform| (platform.clone(), default_binary(&service_id, platform)))
        .collect();

    let mut dependencies: Vec<String> = detected
        .iter()
        .map(|name| profile.swaps.get(name).cloned().unwrap_or_else(|| name.clone()))
        .collect();
    dependencies.sort();
    dependencies.dedup();

    BundleManifest {
        schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
        scenario: profile.scenario.clone(),
        profile_id: profile.id.clone(),
        version: profile.version.clone(),
        generated_at: Utc::now(),
        services: vec![ServiceEntry {
            id: service_id,
            kind: "api".to_string(),
            binaries,
            build: Some(BuildConfig {
                kind: "go".to_string(),
                source_dir: "api".to_string(),
                entrypoint: None,
            }),
        }],
        swaps: profile
            .swaps
            .iter()
            .map(|(from, to)| SwapEntry {
                from: from.clone(),
                to: to.clone(),
            })
            .collect(),
        dependencies,
        signing: None,
        targets: profile.targets.clone(),
    }
}

pub fn manifest_path(output_dir: &Path, scenario: &str) -> PathBuf {
    output_dir.join(scenario).join(MANIFEST_FILE)
}

/// Write the manifest with two-space indentation, replacing any previous export.
pub fn export_manifest(manifest: &BundleManifest, output_dir: &Path) -> Result<PathBuf> {
    let path = manifest_path(output_dir, &manifest.scenario);
    let dir = path
        .parent()
        .ok_or_else(|| DeploymentError::Configuration("manifest path has no parent".into()))?;
    std::fs::create_dir_all(dir).map_err(|e| DeploymentError::io(dir, e))?;

    let mut body = serde_json::to_string_pretty(manifest)?;
    body.push('\n');
    let tmp = dir.join(format!(".{}.tmp", MANIFEST_FILE));
    std::fs::write(&tmp, body).map_err(|e| DeploymentError::io(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| DeploymentError::io(&path, e))?;
    Ok(path)
}

pub fn load_manifest(path: &Path) -> Result<BundleManifest> {
    let text = std::fs::read_to_string(path).map_err(|e| DeploymentError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Point every service at the freshly built binaries and drop its build config.
///
/// `built` maps platform → binary path as reported by the packager. Paths are
/// made relative to `manifest_dir` and always use forward slashes. Services
/// keep binaries for platforms the build did not report.
pub fn rewrite_binary_paths(
    manifest: &mut BundleManifest,
    manifest_dir: &Path,
    built: &BTreeMap<String, String>,
) -> usize {
    let mut rewritten = 0;
    for service in &mut manifest.services {
        for (platform, path) in built {
            let relative = relative_to(manifest_dir, Path::new(path));
            service.binaries.insert(platform.clone(), to_forward_slashes(&relative));
            rewritten += 1;
        }
        for path in service.binaries.values_mut() {
            if path.contains('\\') {
                *path = path.replace('\\', "/");
            }
        }
        service.build = None;
    }
    rewritten
}

/// `target` expressed relative to `base`. Relative targets are returned as is.
fn relative_to(base: &Path, target: &Path) -> PathBuf {
    if !target.is_absolute() || !base.is_absolute() {
        return target.to_path_buf();
    }

    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn profile() -> DeploymentProfile {
        let mut profile = DeploymentProfile::new("desk", "picker-wheel").with_swap("postgres", "sqlite");
        profile.targets = vec!["linux".into(), "win".into()];
        profile
    }

    #[test]
    fn test_assemble_applies_swaps() {
        let detected = vec!["redis".to_string(), "postgres".to_string(), "sqlite".to_string()];
        let manifest = assemble_manifest(&profile(), &detected);

        assert_eq!(manifest.dependencies, vec!["redis".to_string(), "sqlite".to_string()]);
        assert_eq!(
            manifest.swaps,
            vec![SwapEntry {
                from: "postgres".into(),
                to: "sqlite".into()
            }]
        );
        let service = &manifest.services[0];
        assert_eq!(service.binaries["win"], "bin/win/picker-wheel-api.exe");
        assert!(service.build.is_some());
    }

    #[test]
    fn test_export_writes_bundle_json() {
        let dir = TempDir::new().unwrap();
        let manifest = assemble_manifest(&profile(), &[]);
        let path = export_manifest(&manifest, dir.path()).unwrap();

        assert_eq!(path, dir.path().join("picker-wheel").join("bundle.json"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"schemaVersion\""));
        assert_eq!(load_manifest(&path).unwrap(), manifest);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_makes_paths_relative() {
        let mut manifest = assemble_manifest(&profile(), &[]);
        let built = BTreeMap::from([(
            "linux".to_string(),
            "/out/builds/linux/picker-wheel-api".to_string(),
        )]);

        let count = rewrite_binary_paths(&mut manifest, Path::new("/out/bundle/picker-wheel"), &built);

        assert_eq!(count, 1);
        let service = &manifest.services[0];
        assert_eq!(service.binaries["linux"], "../../builds/linux/picker-wheel-api");
        assert_eq!(service.binaries["win"], "bin/win/picker-wheel-api.exe");
        assert!(service.build.is_none());
    }

    #[test]
    fn test_relative_inputs_only_normalize_slashes() {
        let mut manifest = assemble_manifest(&profile(), &[]);
        let built = BTreeMap::from([("win".to_string(), "dist\\win\\api.exe".to_string())]);
        rewrite_binary_paths(&mut manifest, Path::new("bundle"), &built);
        assert_eq!(manifest.services[0].binaries["win"], "dist/win/api.exe");
    }
}
