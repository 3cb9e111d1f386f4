// ABOUTME: Shared plumbing for the vrooli binary: logging setup, argument parsing and wiring
// ABOUTME: Builds managers, runners and orchestrators from resolved Settings

pub mod args;
pub mod context;
pub mod error;
pub mod logging;

pub use context::AppContext;
pub use error::CliError;
