// ABOUTME: Source scanner that detects resource, scenario and workflow references in a scenario tree
// ABOUTME: Skips vendored, built, test and story files; only explicit invocations count as references

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::error::{AnalyzerError, Result};
use crate::types::{AccessMethod, DependencyType, DetectedDependency};

/// Resources that can be promoted from `FOO_URL` / `FOO_HOST` references.
pub const KNOWN_RESOURCES: &[&str] = &[
    "browserless",
    "claude-code",
    "comfyui",
    "judge0",
    "litellm",
    "minio",
    "n8n",
    "node-red",
    "ollama",
    "playwright-driver",
    "postgres",
    "qdrant",
    "questdb",
    "redis",
    "searxng",
    "vault",
    "whisper",
    "windmill",
];

const RESOURCE_ALIASES: &[(&str, &str)] = &[("postgresql", "postgres"), ("pg", "postgres")];

const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "coverage",
    "vendor",
    "test",
    "tests",
    "__tests__",
    "testdata",
    ".git",
    ".vrooli",
];

const SCANNED_EXTENSIONS: &[&str] = &[
    "go", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "sh", "bash", "json", "yaml", "yml",
    "toml", "rs",
];

pub const MAX_SCANNED_FILE_BYTES: u64 = 1024 * 1024;

struct Patterns {
    env_reference: Regex,
    resource_cli: Regex,
    scenario_cli: Regex,
    port_resolver: Regex,
    string_constant: Regex,
    workflow_file: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        Ok(Self {
            env_reference: Regex::new(r"\b([A-Z][A-Z0-9]*(?:_[A-Z0-9]+)*)_(?:URL|HOST)\b")?,
            resource_cli: Regex::new(r"\bresource-([a-z0-9](?:[a-z0-9-]*[a-z0-9])?)\b")?,
            scenario_cli: Regex::new(
                r"\bvrooli\s+scenario\s+(?:run|start|stop|restart|status|logs|port|test)\s+([a-z0-9][a-z0-9-]*)",
            )?,
            port_resolver: Regex::new(
                r#"\b(?:resolveScenarioPort|getScenarioPort|ResolveScenarioPort|GetScenarioPort|resolve_scenario_port)\s*\(\s*(?:["']([a-z0-9][a-z0-9-]*)["']|([A-Za-z_][A-Za-z0-9_]*))"#,
            )?,
            string_constant: Regex::new(
                r#"\b([A-Za-z_][A-Za-z0-9_]*)\s*(?::\s*[A-Za-z]+\s*)?:?=\s*["']([a-z0-9][a-z0-9-]*)["']"#,
            )?,
            workflow_file: Regex::new(r"\bworkflows/([A-Za-z0-9_-]+)\.json\b")?,
        })
    }
}

pub struct DependencyScanner {
    known_scenarios: BTreeSet<String>,
    known_resources: BTreeSet<String>,
    patterns: Patterns,
}

impl DependencyScanner {
    pub fn new<I, S>(known_scenarios: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            known_scenarios: known_scenarios.into_iter().map(Into::into).collect(),
            known_resources: KNOWN_RESOURCES.iter().map(|r| r.to_string()).collect(),
            patterns: Patterns::compile()?,
        })
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_resources
            .extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn is_known_scenario(&self, name: &str) -> bool {
        self.known_scenarios.contains(name)
    }

    /// Walk `root` and collect unique dependencies, ordered by type then name.
    pub fn scan(&self, scenario: &str, root: &Path) -> Result<Vec<DetectedDependency>> {
        let mut found: BTreeMap<(DependencyType, String), DetectedDependency> = BTreeMap::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                AnalyzerError::io(&path, std::io::Error::from(e))
            })?;
            if !entry.file_type().is_file() || !is_scanned_file(&entry) {
                continue;
            }
            let too_large = entry
                .metadata()
                .map(|m| m.len() > MAX_SCANNED_FILE_BYTES)
                .unwrap_or(true);
            if too_large {
                continue;
            }

            // Binary or non-UTF-8 files carry no references we can read
            let Ok(text) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            for mut dependency in self.scan_text(scenario, &text) {
                let key = (dependency.dependency_type, dependency.dependency_name.clone());
                found.entry(key).or_insert_with(|| {
                    dependency.source_file = Some(relative.clone());
                    dependency
                });
            }
        }

        Ok(found.into_values().collect())
    }

    /// References in one file's text. `scenario` itself is never reported.
    pub fn scan_text(&self, scenario: &str, text: &str) -> Vec<DetectedDependency> {
        let mut detected = Vec::new();

        for caps in self.patterns.env_reference.captures_iter(text) {
            if let Some(resource) = self.resource_for_env_prefix(&caps[1]) {
                detected.push(DetectedDependency::new(
                    resource,
                    DependencyType::Resource,
                    AccessMethod::Env,
                ));
            }
        }

        for caps in self.patterns.resource_cli.captures_iter(text) {
            detected.push(DetectedDependency::new(
                canonical_resource(&caps[1]),
                DependencyType::Resource,
                AccessMethod::ResourceCli,
            ));
        }

        for caps in self.patterns.scenario_cli.captures_iter(text) {
            let name = &caps[1];
            if name != scenario && self.is_known_scenario(name) {
                detected.push(DetectedDependency::new(
                    name,
                    DependencyType::Scenario,
                    AccessMethod::VrooliCli,
                ));
            }
        }

        let constants: HashMap<&str, &str> = self
            .patterns
            .string_constant
            .captures_iter(text)
            .filter_map(|caps| {
                Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
            })
            .collect();
        for caps in self.patterns.port_resolver.captures_iter(text) {
            let name = match (caps.get(1), caps.get(2)) {
                (Some(literal), _) => Some(literal.as_str()),
                (None, Some(ident)) => constants.get(ident.as_str()).copied(),
                _ => None,
            };
            if let Some(name) = name {
                if name != scenario && self.is_known_scenario(name) {
                    detected.push(DetectedDependency::new(
                        name,
                        DependencyType::Scenario,
                        AccessMethod::PortResolver,
                    ));
                }
            }
        }

        for caps in self.patterns.workflow_file.captures_iter(text) {
            detected.push(DetectedDependency::new(
                &caps[1],
                DependencyType::Workflow,
                AccessMethod::File,
            ));
        }

        detected
    }

    /// `N8N_BASE` tries `n8n-base`, then `n8n`.
    fn resource_for_env_prefix(&self, prefix: &str) -> Option<String> {
        let parts: Vec<String> = prefix.split('_').map(str::to_lowercase).collect();
        (1..=parts.len()).rev().find_map(|len| {
            let candidate = canonical_resource(&parts[..len].join("-"));
            self.known_resources
                .contains(&candidate)
                .then_some(candidate)
        })
    }
}

fn canonical_resource(name: &str) -> String {
    RESOURCE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| name.to_string())
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn is_scanned_file(entry: &DirEntry) -> bool {
    let Some(name) = entry.file_name().to_str() else {
        return false;
    };
    if name.contains(".stories.")
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.ends_with("_test.go")
    {
        return false;
    }
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCANNED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanner() -> DependencyScanner {
        DependencyScanner::new(["app-monitor", "image-tools", "me"]).unwrap()
    }

    fn names(found: &[DetectedDependency], kind: DependencyType) -> Vec<String> {
        found
            .iter()
            .filter(|d| d.dependency_type == kind)
            .map(|d| d.dependency_name.clone())
            .collect()
    }

    #[test]
    fn test_env_references_promote_known_resources() {
        let found = scanner().scan_text(
            "me",
            r#"url := os.Getenv("POSTGRES_URL"); h := os.Getenv("N8N_BASE_URL"); d := os.Getenv("DATABASE_URL"); r := process.env.REDIS_HOST"#,
        );
        assert_eq!(
            names(&found, DependencyType::Resource),
            vec!["postgres", "n8n", "redis"]
        );
        assert!(found.iter().all(|d| d.access_method == AccessMethod::Env));
    }

    #[test]
    fn test_resource_cli_and_alias() {
        let found = scanner().scan_text("me", "resource-postgresql status\nresource-ollama models list");
        assert_eq!(
            names(&found, DependencyType::Resource),
            vec!["postgres", "ollama"]
        );
    }

    #[test]
    fn test_scenario_cli_requires_known_scenario() {
        let found = scanner().scan_text(
            "me",
            "vrooli scenario run app-monitor\nvrooli scenario start unknown-thing\nvrooli scenario status me",
        );
        assert_eq!(names(&found, DependencyType::Scenario), vec!["app-monitor"]);
    }

    #[test]
    fn test_plain_mentions_do_not_count() {
        let found = scanner().scan_text("me", r#"const supported = ["n8n", "app-monitor", "postgres"];"#);
        assert!(found.is_empty());
    }

    #[test]
    fn test_port_resolver_with_constant() {
        let text = r#"
const IMAGE_TOOLS_ID = "image-tools";
const port = await resolveScenarioPort(IMAGE_TOOLS_ID);
const other = await getScenarioPort('app-monitor');
"#;
        let found = scanner().scan_text("me", text);
        assert_eq!(
            names(&found, DependencyType::Scenario),
            vec!["image-tools", "app-monitor"]
        );
        assert!(found
            .iter()
            .all(|d| d.access_method == AccessMethod::PortResolver));
    }

    #[test]
    fn test_scan_skips_vendored_and_test_files() {
        let root = TempDir::new().unwrap();
        let write = |rel: &str, body: &str| {
            let path = root.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        };
        write("api/main.go", "os.Getenv(\"REDIS_URL\")");
        write("api/main_test.go", "os.Getenv(\"QDRANT_URL\")");
        write("ui/node_modules/pkg/index.js", "process.env.MINIO_URL");
        write("ui/src/Button.stories.tsx", "process.env.OLLAMA_URL");
        write("test/run.sh", "resource-vault status");
        write("docs/notes.md", "resource-whisper");
        write("cli/install.sh", "resource-redis start");

        let found = scanner().scan("me", root.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dependency_name, "redis");
        assert_eq!(found[0].source_file.as_deref(), Some("api/main.go"));
    }
}
