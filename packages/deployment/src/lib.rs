// ABOUTME: Desktop deployment for scenarios: profiles, blocker validation and bundle manifests
// ABOUTME: The orchestrator drives the remote packager and records a per-step outcome log

pub mod blockers;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod packager;
pub mod profile;
pub mod signing;

pub use blockers::{find_blockers, Blocker, BLOCKING_DEPENDENCIES};
pub use error::{DeploymentError, Result};
pub use manifest::{
    assemble_manifest, export_manifest, load_manifest, rewrite_binary_paths, BundleManifest,
    ServiceEntry, SwapEntry, MANIFEST_FILE,
};
pub use orchestrator::{
    DeploymentOrchestrator, OrchestrationRequest, OrchestrationResult, OrchestrationStatus,
    OrchestrationStep, OrchestratorConfig, StepName, StepStatus,
};
pub use packager::{
    clamp_poll_interval, wait_for_build, BuildStatus, BuildStatusSource, Packager, PackagerClient,
};
pub use profile::{DeploymentProfile, ProfileStore};
pub use signing::{check_signing_readiness, PlatformSigning, SigningConfig};
