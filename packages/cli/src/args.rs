// ABOUTME: Parsers for composite command-line values
// ABOUTME: KEY=VALUE environment pairs, second-based timeouts and instruction files

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use vrooli_core::CompiledInstruction;

use crate::error::CliError;

/// Parse `KEY=VALUE`. The value may be empty or contain further `=`.
pub fn parse_env_pair(raw: &str) -> Result<(String, String), CliError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::InvalidEnvPair(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(CliError::InvalidEnvPair(raw.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn env_map(pairs: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    pairs.iter().map(|raw| parse_env_pair(raw)).collect()
}

/// Zero means no timeout.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Instructions are either a bare array or `{"instructions": [...]}`.
pub fn load_instructions(path: &Path) -> anyhow::Result<Vec<CompiledInstruction>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let list = match value {
        serde_json::Value::Object(mut map) => map
            .remove("instructions")
            .ok_or_else(|| CliError::InvalidArgument {
                name: "instructions".into(),
                message: format!("{} has no instructions array", path.display()),
            })?,
        other => other,
    };
    Ok(serde_json::from_value(list)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_env_pairs() {
        assert_eq!(
            parse_env_pair("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert_eq!(parse_env_pair("EMPTY=").unwrap().1, "");
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=x").is_err());

        let map = env_map(&["B=2".into(), "A=1".into()]).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_timeout_zero_disables() {
        assert_eq!(timeout_from_secs(0), None);
        assert_eq!(timeout_from_secs(5), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_load_instructions_both_shapes() {
        let dir = TempDir::new().unwrap();
        let bare = dir.path().join("bare.json");
        std::fs::write(
            &bare,
            r#"[{"index": 0, "nodeId": "n1", "type": "navigate", "params": {"url": "https://example.com"}}]"#,
        )
        .unwrap();
        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(
            &wrapped,
            r#"{"instructions": [{"index": 0, "nodeId": "n1", "type": "click"}]}"#,
        )
        .unwrap();

        assert_eq!(load_instructions(&bare).unwrap()[0].action_type, "navigate");
        assert_eq!(load_instructions(&wrapped).unwrap()[0].node_id, "n1");
        assert!(load_instructions(&dir.path().join("missing.json")).is_err());
    }
}
