// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names read by the substrate

// Browser Driver
pub const PLAYWRIGHT_DRIVER_URL: &str = "PLAYWRIGHT_DRIVER_URL";
pub const MAX_SESSIONS: &str = "MAX_SESSIONS";
pub const BROWSERLESS_URL: &str = "BROWSERLESS_URL"; // Legacy driver backend

// Vrooli Layout
pub const VROOLI_ROOT: &str = "VROOLI_ROOT";
pub const VROOLI_SCENARIOS_DIR: &str = "VROOLI_SCENARIOS_DIR";
pub const VROOLI_DATA_DIR: &str = "VROOLI_DATA_DIR";
pub const VROOLI_SANDBOX_DIR: &str = "VROOLI_SANDBOX_DIR";
pub const VROOLI_DATABASE_URL: &str = "VROOLI_DATABASE_URL";

// Integration harness gate (presence-based)
pub const VROOLI_LIFECYCLE_MANAGED: &str = "VROOLI_LIFECYCLE_MANAGED";

// Deployment
pub const DEPLOYMENT_PACKAGER_URL: &str = "DEPLOYMENT_PACKAGER_URL";

// Tool Registry
pub const TOOL_REGISTRY_PORT: &str = "TOOL_REGISTRY_PORT";

// System Environment Variables
pub const HOME: &str = "HOME";
