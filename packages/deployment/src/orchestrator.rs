// ABOUTME: Multi-step desktop deployment pipeline driven by a deployment profile
// ABOUTME: Records one OrchestrationStep per stage; later stages skip when their inputs failed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vrooli_dependencies::{DependencyAnalyzer, DependencyType};

use crate::blockers::{blocker_error, find_blockers};
use crate::error::{DeploymentError, Result};
use crate::manifest::{assemble_manifest, export_manifest, rewrite_binary_paths, BundleManifest};
use crate::packager::{
    wait_for_build, BuildBinariesRequest, BuildStatus, DesktopGenerateRequest, InstallerRequest,
    Packager, DEFAULT_POLL_INTERVAL,
};
use crate::profile::{DeploymentProfile, ProfileStore};
use crate::signing::{check_signing_readiness, SigningConfig};

pub const DEFAULT_ORCHESTRATION_TIMEOUT: Duration = Duration::from_secs(45 * 60);
pub const SUPPORTED_PLATFORMS: &[&str] = &["win", "mac", "linux"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepName {
    LoadProfile,
    ValidateProfile,
    ApplySigningConfig,
    CheckSigningReadiness,
    AssembleManifest,
    ExportManifest,
    BuildBinaries,
    GenerateDesktopWrapper,
    BuildPlatformInstallers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Success,
    Failed,
    Skipped,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationStep {
    pub name: StepName,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub profile_id: String,
    pub status: OrchestrationStatus,
    pub steps: Vec<OrchestrationStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl OrchestrationResult {
    pub fn step(&self, name: StepName) -> Option<&OrchestrationStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    pub profile_id: String,
    pub output_dir: PathBuf,
    pub skip_build: bool,
    pub skip_packaging: bool,
    /// Overrides the profile's targets when non-empty.
    pub platforms: Vec<String>,
    pub poll_interval: Option<Duration>,
}

impl OrchestrationRequest {
    pub fn new(profile_id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_id: profile_id.into(),
            output_dir: output_dir.into(),
            skip_build: false,
            skip_packaging: false,
            platforms: Vec::new(),
            poll_interval: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ORCHESTRATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Accumulates step records in pipeline order.
struct StepLog {
    steps: Vec<OrchestrationStep>,
}

impl StepLog {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn start(&mut self, name: StepName) -> usize {
        self.steps.push(OrchestrationStep {
            name,
            status: StepStatus::Running,
            message: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        });
        self.steps.len() - 1
    }

    fn finish(&mut self, index: usize, status: StepStatus, message: Option<String>, error: Option<String>) {
        let step = &mut self.steps[index];
        step.status = status;
        step.message = message;
        step.error = error;
        step.completed_at = Some(Utc::now());
    }

    fn success(&mut self, index: usize, message: impl Into<String>) {
        self.finish(index, StepStatus::Success, Some(message.into()), None);
    }

    fn fail(&mut self, index: usize, error: &DeploymentError) {
        let message = error.remediation().map(|r| format!("Remediation: {}", r));
        self.finish(index, StepStatus::Failed, message, Some(error.to_string()));
    }

    fn skip(&mut self, name: StepName, reason: &str) {
        let index = self.start(name);
        self.finish(index, StepStatus::Skipped, Some(reason.to_string()), None);
    }

    fn any_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }
}

pub struct DeploymentOrchestrator {
    profiles: ProfileStore,
    analyzer: Option<DependencyAnalyzer>,
    packager: Arc<dyn Packager>,
    config: OrchestratorConfig,
}

impl DeploymentOrchestrator {
    pub fn new(
        profiles: ProfileStore,
        analyzer: Option<DependencyAnalyzer>,
        packager: Arc<dyn Packager>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            profiles,
            analyzer,
            packager,
            config,
        }
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Dependencies the profile's scenario needs: the profile override when
    /// present, otherwise the analyzer's detected resources.
    pub fn detected_dependencies(&self, profile: &DeploymentProfile) -> Result<Vec<String>> {
        if let Some(dependencies) = &profile.dependencies {
            return Ok(dependencies.clone());
        }
        let analyzer = self.analyzer.as_ref().ok_or_else(|| {
            DeploymentError::Configuration(
                "no dependency analyzer configured and the profile has no dependency list".into(),
            )
        })?;
        let analysis = analyzer.analyze(&profile.scenario)?;
        Ok(analysis
            .detected_names(DependencyType::Resource)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Check profile shape and the blocker catalog. Returns the detected dependencies.
    pub fn validate_profile(&self, profile: &DeploymentProfile) -> Result<Vec<String>> {
        if profile.scenario.trim().is_empty() {
            return Err(DeploymentError::validation(format!(
                "profile {} does not name a scenario",
                profile.id
            )));
        }
        if let Some(platform) = profile
            .targets
            .iter()
            .find(|t| !SUPPORTED_PLATFORMS.contains(&t.as_str()))
        {
            return Err(DeploymentError::Validation {
                message: format!("profile {} targets unsupported platform {}", profile.id, platform),
                remediation: Some(format!("use one of: {}", SUPPORTED_PLATFORMS.join(", "))),
            });
        }

        let detected = self.detected_dependencies(profile)?;
        let blockers = find_blockers(&detected, &profile.swaps);
        if !blockers.is_empty() {
            return Err(blocker_error(&profile.id, &blockers));
        }
        Ok(detected)
    }

    /// Add or replace a swap on a stored profile.
    pub fn add_swap(&self, profile_id: &str, from: &str, to: &str) -> Result<DeploymentProfile> {
        let mut profile = self.profiles.load(profile_id)?;
        profile.swaps.insert(from.to_string(), to.to_string());
        self.profiles.save(&profile)?;
        info!(profile_id, from, to, "Dependency swap recorded");
        Ok(profile)
    }

    /// Run the pipeline under the global timeout.
    pub async fn run(
        &self,
        request: &OrchestrationRequest,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult> {
        match tokio::time::timeout(self.config.timeout, self.run_pipeline(request, cancel)).await {
            Ok(result) => Ok(result),
            Err(_) => {
                cancel.cancel();
                Err(DeploymentError::Timeout(self.config.timeout))
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &OrchestrationRequest,
        cancel: &CancellationToken,
    ) -> OrchestrationResult {
        let started_at = Utc::now();
        let mut log = StepLog::new();
        let manifest_path = self.execute_steps(request, cancel, &mut log).await;

        let status = if log.any_failed() {
            OrchestrationStatus::Failed
        } else {
            OrchestrationStatus::Success
        };
        info!(
            profile_id = %request.profile_id,
            status = ?status,
            steps = log.steps.len(),
            "Deployment orchestration finished"
        );

        OrchestrationResult {
            profile_id: request.profile_id.clone(),
            status,
            steps: log.steps,
            manifest_path,
            started_at,
            completed_at: Utc::now(),
        }
    }

    async fn execute_steps(
        &self,
        request: &OrchestrationRequest,
        cancel: &CancellationToken,
        log: &mut StepLog,
    ) -> Option<PathBuf> {
        let step = log.start(StepName::LoadProfile);
        let profile = match self.profiles.load(&request.profile_id) {
            Ok(profile) => {
                log.success(step, format!("loaded profile for scenario {}", profile.scenario));
                profile
            }
            Err(e) => {
                log.fail(step, &e);
                return None;
            }
        };

        let step = log.start(StepName::ValidateProfile);
        let detected = match self.validate_profile(&profile) {
            Ok(detected) => {
                log.success(step, format!("{} dependencies, no unswapped blockers", detected.len()));
                detected
            }
            Err(e) => {
                log.fail(step, &e);
                return None;
            }
        };

        let signing = apply_signing(&profile, log);

        let step = log.start(StepName::CheckSigningReadiness);
        let readiness = check_signing_readiness(signing.as_ref(), self.profiles.dir());
        if readiness.ready {
            log.success(step, "signing ready");
        } else {
            warn!(profile_id = %profile.id, issues = ?readiness.issues, "Signing not ready");
            log.finish(step, StepStatus::Warning, Some(readiness.issues.join("; ")), None);
        }

        let step = log.start(StepName::AssembleManifest);
        let mut manifest = assemble_manifest(&profile, &detected);
        manifest.signing = signing;
        log.success(step, format!("{} services", manifest.services.len()));

        let step = log.start(StepName::ExportManifest);
        let manifest_path = match export_manifest(&manifest, &request.output_dir) {
            Ok(path) => {
                log.success(step, path.display().to_string());
                path
            }
            Err(e) => {
                log.fail(step, &e);
                let reason = "manifest export failed";
                log.skip(StepName::BuildBinaries, reason);
                log.skip(StepName::GenerateDesktopWrapper, reason);
                log.skip(StepName::BuildPlatformInstallers, reason);
                return None;
            }
        };

        let platforms = if request.platforms.is_empty() {
            profile.targets.clone()
        } else {
            request.platforms.clone()
        };
        let poll_interval = request.poll_interval.unwrap_or(self.config.poll_interval);

        if request.skip_build {
            log.skip(StepName::BuildBinaries, "build skipped by request");
        } else {
            let step = log.start(StepName::BuildBinaries);
            match self
                .build_binaries(&mut manifest, &manifest_path, &platforms, poll_interval, cancel)
                .await
            {
                Ok(count) => log.success(step, format!("{} binary paths rewritten", count)),
                Err(e) => log.fail(step, &e),
            }
        }

        if request.skip_packaging {
            log.skip(StepName::GenerateDesktopWrapper, "packaging skipped by request");
            log.skip(StepName::BuildPlatformInstallers, "packaging skipped by request");
            return Some(manifest_path);
        }

        let step = log.start(StepName::GenerateDesktopWrapper);
        let wrapper_request = DesktopGenerateRequest {
            manifest_path: manifest_path.display().to_string(),
            platforms: platforms.clone(),
            output_path: request.output_dir.join(&profile.scenario).join("desktop").display().to_string(),
        };
        let wrapper = match self.packager.generate_desktop(&wrapper_request).await {
            Ok(started) => self.await_remote(started, poll_interval, cancel).await,
            Err(e) => Err(e),
        };
        let wrapper = match wrapper {
            Ok(status) => {
                log.success(step, status.output_path.clone().unwrap_or_else(|| status.build_id.clone()));
                status
            }
            Err(e) => {
                log.fail(step, &e);
                log.skip(StepName::BuildPlatformInstallers, "desktop wrapper failed");
                return Some(manifest_path);
            }
        };

        let step = log.start(StepName::BuildPlatformInstallers);
        let installer_request = InstallerRequest {
            build_id: wrapper.build_id.clone(),
            platforms,
        };
        let installers = match self.packager.build_installers(&installer_request).await {
            Ok(started) => self.await_remote(started, poll_interval, cancel).await,
            Err(e) => Err(e),
        };
        match installers {
            Ok(status) => log.success(step, format!("{} artifacts", status.artifacts.len())),
            Err(e) => log.fail(step, &e),
        }

        Some(manifest_path)
    }

    async fn build_binaries(
        &self,
        manifest: &mut BundleManifest,
        manifest_path: &Path,
        platforms: &[String],
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let request = BuildBinariesRequest {
            manifest_path: manifest_path.display().to_string(),
            platforms: platforms.to_vec(),
        };
        let started = self.packager.build_binaries(&request).await?;
        let status = self.await_remote(started, poll_interval, cancel).await?;

        let manifest_dir = manifest_path
            .parent()
            .ok_or_else(|| DeploymentError::Configuration("manifest path has no parent".into()))?;
        let manifest_dir = std::path::absolute(manifest_dir)
            .map_err(|e| DeploymentError::io(manifest_dir, e))?;
        let count = rewrite_binary_paths(manifest, &manifest_dir, &status.binaries());
        let output_dir = manifest_dir
            .parent()
            .ok_or_else(|| DeploymentError::Configuration("manifest dir has no parent".into()))?;
        export_manifest(manifest, output_dir)?;
        Ok(count)
    }

    /// Resolve a just-submitted job: terminal responses return at once,
    /// anything else is polled by build id.
    async fn await_remote(
        &self,
        started: BuildStatus,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<BuildStatus> {
        if started.is_success() {
            return Ok(started);
        }
        if started.is_failed() {
            return Err(DeploymentError::BuildFailed {
                message: started
                    .error
                    .unwrap_or_else(|| "build failed without an error message".to_string()),
                build_id: started.build_id,
            });
        }
        if started.build_id.is_empty() {
            return Err(DeploymentError::BuildFailed {
                build_id: "<none>".into(),
                message: format!("packager returned status {:?} without a build id", started.status),
            });
        }
        wait_for_build(self.packager.as_ref(), &started.build_id, poll_interval, cancel).await
    }
}

/// Record ApplySigningConfig only for enabled signing and hand back what the manifest carries.
fn apply_signing(profile: &DeploymentProfile, log: &mut StepLog) -> Option<SigningConfig> {
    let signing = profile.signing.as_ref().filter(|s| s.enabled)?;
    let step = log.start(StepName::ApplySigningConfig);
    log.success(step, format!("{} platforms configured", signing.platforms.len()));
    Some(signing.clone())
}
