// ABOUTME: Builds substrate components from Settings for a single command invocation
// ABOUTME: Opens the SQLite database lazily and creates the directories it needs

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use vrooli_config::Settings;
use vrooli_dependencies::DependencyAnalyzer;
use vrooli_deployment::{DeploymentOrchestrator, OrchestratorConfig, PackagerClient, ProfileStore};
use vrooli_driver::DriverClient;
use vrooli_executions::{
    ExecutionWriter, FilesystemArtifactStorage, SqliteExecutionIndex, WorkflowExecutor,
    WorkflowRunner, WriterConfig,
};
use vrooli_sandbox::{ManagerConfig, SandboxManager, SandboxStore};

const MAX_DB_CONNECTIONS: u32 = 5;

pub struct AppContext {
    pub settings: Settings,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn from_env() -> Result<Self> {
        let settings = Settings::from_env().context("failed to resolve settings")?;
        Ok(Self::new(settings))
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.settings
            .vrooli_root
            .join("data")
            .join("deployment")
            .join("profiles")
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.settings
            .vrooli_root
            .join("data")
            .join("deployment")
            .join("bundles")
    }

    pub async fn pool(&self) -> Result<SqlitePool> {
        let url = &self.settings.database_url;
        // In-memory databases exist per connection
        let mut max_connections = 1;
        if let Some(path) = sqlite_file_path(url) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            max_connections = MAX_DB_CONNECTIONS;
        }
        debug!(database_url = %url, "Opening database");
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("failed to open database {}", url))
    }

    pub async fn sandbox_manager(&self) -> Result<SandboxManager> {
        let store = SandboxStore::new(self.pool().await?);
        store.init().await?;
        std::fs::create_dir_all(&self.settings.sandbox_dir).with_context(|| {
            format!("failed to create {}", self.settings.sandbox_dir.display())
        })?;
        Ok(SandboxManager::new(
            store,
            ManagerConfig::new(&self.settings.sandbox_dir),
        ))
    }

    pub async fn workflow_runner(&self) -> Result<WorkflowRunner> {
        let index = SqliteExecutionIndex::new(self.pool().await?);
        index.init().await?;

        let data_dir = &self.settings.data_dir;
        let writer = ExecutionWriter::new(WriterConfig::new(data_dir))
            .with_index(Arc::new(index))
            .with_storage(Arc::new(FilesystemArtifactStorage::new(
                data_dir.join("artifacts"),
            )));
        let driver = DriverClient::new(&self.settings.driver_url)?;
        let executor = WorkflowExecutor::new(Some(Arc::new(driver)), Arc::new(writer));
        Ok(WorkflowRunner::new(
            Arc::new(executor),
            self.settings.max_sessions,
        ))
    }

    pub fn analyzer(&self) -> Result<DependencyAnalyzer> {
        Ok(DependencyAnalyzer::new(&self.settings.scenarios_dir)?)
    }

    pub fn orchestrator(&self, profiles_dir: Option<PathBuf>) -> Result<DeploymentOrchestrator> {
        let profiles = ProfileStore::new(profiles_dir.unwrap_or_else(|| self.profiles_dir()));
        let analyzer = if self.settings.scenarios_dir.is_dir() {
            Some(self.analyzer()?)
        } else {
            None
        };
        let packager = PackagerClient::new(&self.settings.packager_url)?;
        Ok(DeploymentOrchestrator::new(
            profiles,
            analyzer,
            Arc::new(packager),
            OrchestratorConfig::default(),
        ))
    }
}

/// Filesystem path behind a `sqlite://` URL, if it names a file.
pub fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(root: &Path) -> Settings {
        let root = root.display().to_string();
        Settings::from_lookup(move |key| match key {
            "VROOLI_ROOT" => Some(root.clone()),
            "VROOLI_DATABASE_URL" => Some("sqlite::memory:".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite:///tmp/v/substrate.db?mode=rwc"),
            Some(PathBuf::from("/tmp/v/substrate.db"))
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://x"), None);
    }

    #[test]
    fn test_directories_follow_root() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(settings(dir.path()));
        assert_eq!(
            ctx.profiles_dir(),
            dir.path().join("data").join("deployment").join("profiles")
        );
        assert!(ctx.bundles_dir().ends_with("deployment/bundles"));
    }

    #[tokio::test]
    async fn test_sandbox_manager_on_memory_database() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(settings(dir.path()));
        let manager = ctx.sandbox_manager().await.unwrap();
        assert!(manager.list(None).await.unwrap().is_empty());
        assert!(ctx.settings.sandbox_dir.is_dir());
    }
}
