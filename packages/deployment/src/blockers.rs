// ABOUTME: Catalog of dependencies that cannot ship in a desktop bundle without a swap
// ABOUTME: Produces blocker reports and the remediation commands that resolve them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::DeploymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingDependency {
    pub name: &'static str,
    pub swap_to: &'static str,
    pub reason: &'static str,
}

pub const BLOCKING_DEPENDENCIES: &[BlockingDependency] = &[
    BlockingDependency {
        name: "postgres",
        swap_to: "sqlite",
        reason: "requires a database server",
    },
    BlockingDependency {
        name: "redis",
        swap_to: "in-process",
        reason: "requires a cache server",
    },
    BlockingDependency {
        name: "browserless",
        swap_to: "playwright-driver",
        reason: "requires a remote browser pool",
    },
    BlockingDependency {
        name: "n8n",
        swap_to: "embedded-workflows",
        reason: "requires a workflow server",
    },
    BlockingDependency {
        name: "qdrant",
        swap_to: "faiss-local",
        reason: "requires a vector database server",
    },
];

pub fn find_blocking(name: &str) -> Option<&'static BlockingDependency> {
    BLOCKING_DEPENDENCIES.iter().find(|b| b.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocker {
    pub dependency: String,
    pub suggested_swap: String,
    pub reason: String,
}

impl Blocker {
    pub fn label(&self) -> String {
        format!("{} (swap to {})", self.dependency, self.suggested_swap)
    }

    pub fn remediation(&self, profile_id: &str) -> String {
        format!(
            "vrooli deploy swap {} {} {}",
            profile_id, self.dependency, self.suggested_swap
        )
    }
}

/// Blocking dependencies present in `detected` with no swap entry, in catalog order.
pub fn find_blockers(detected: &[String], swaps: &BTreeMap<String, String>) -> Vec<Blocker> {
    BLOCKING_DEPENDENCIES
        .iter()
        .filter(|b| detected.iter().any(|d| d == b.name) && !swaps.contains_key(b.name))
        .map(|b| Blocker {
            dependency: b.name.to_string(),
            suggested_swap: b.swap_to.to_string(),
            reason: b.reason.to_string(),
        })
        .collect()
}

/// Validation error naming every blocker with one remediation command per line.
pub fn blocker_error(profile_id: &str, blockers: &[Blocker]) -> DeploymentError {
    let labels: Vec<String> = blockers.iter().map(Blocker::label).collect();
    let commands: Vec<String> = blockers.iter().map(|b| b.remediation(profile_id)).collect();
    DeploymentError::Validation {
        message: format!(
            "profile {} has blocking dependencies without swaps: {}",
            profile_id,
            labels.join(", ")
        ),
        remediation: Some(commands.join("\n")),
    }
}
