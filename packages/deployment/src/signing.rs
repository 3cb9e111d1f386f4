// ABOUTME: Code-signing configuration carried by profiles and manifests
// ABOUTME: Readiness checks only ever warn; they never fail a deployment

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Keyed by platform (`win`, `mac`, `linux`).
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformSigning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSigning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keychain_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningReadiness {
    pub ready: bool,
    pub issues: Vec<String>,
}

/// Inspect a signing config. Relative certificate paths resolve against `base_dir`.
pub fn check_signing_readiness(config: Option<&SigningConfig>, base_dir: &Path) -> SigningReadiness {
    let config = match config {
        Some(config) if config.enabled => config,
        _ => {
            return SigningReadiness {
                ready: false,
                issues: vec!["signing is not configured; installers will be unsigned".to_string()],
            }
        }
    };

    let mut issues = Vec::new();
    if config.platforms.is_empty() {
        issues.push("signing is enabled but no platform is configured".to_string());
    }
    for (platform, entry) in &config.platforms {
        if entry
            .identity
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
        {
            issues.push(format!("{}: signing identity is missing", platform));
        }
        if let Some(file) = &entry.certificate_file {
            let path = base_dir.join(file);
            if !path.is_file() {
                issues.push(format!(
                    "{}: certificate file not found: {}",
                    platform,
                    path.display()
                ));
            }
        }
    }

    SigningReadiness {
        ready: issues.is_empty(),
        issues,
    }
}
