// ABOUTME: Protocol-versioned tool manifest published by a scenario's registry
// ABOUTME: Tool and category bodies stay opaque JSON; only the envelope is typed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{RegistryError, Result};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    pub protocol_version: String,
    pub scenario: String,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub categories: Vec<Value>,
    pub generated_at: DateTime<Utc>,
}

impl ToolManifest {
    pub fn empty(scenario: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            scenario: scenario.into(),
            tools: Vec::new(),
            categories: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let manifest: Self = serde_json::from_str(&text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Every tool must be an object with a non-empty, unique `name`.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (index, tool) in self.tools.iter().enumerate() {
            let name = tool_name(tool).ok_or_else(|| {
                RegistryError::InvalidManifest(format!("tool at index {} has no name", index))
            })?;
            if !seen.insert(name) {
                return Err(RegistryError::InvalidManifest(format!(
                    "duplicate tool name: {}",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn find_tool(&self, name: &str) -> Option<&Value> {
        self.tools.iter().find(|tool| tool_name(tool) == Some(name))
    }
}

fn tool_name(tool: &Value) -> Option<&str> {
    tool.get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_and_validate() {
        let mut manifest = ToolManifest::empty("picker-wheel");
        manifest.tools = vec![json!({"name": "spin"}), json!({"name": "reset"})];
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.find_tool("reset").unwrap()["name"], "reset");
        assert!(manifest.find_tool("missing").is_none());

        manifest.tools.push(json!({"name": "spin"}));
        assert!(matches!(
            manifest.validate(),
            Err(RegistryError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_unnamed_tool_rejected() {
        let mut manifest = ToolManifest::empty("s");
        manifest.tools = vec![json!({"description": "nameless"})];
        assert!(manifest.validate().is_err());
    }
}
