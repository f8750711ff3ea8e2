//! Port Patcher: bump a vcpkg registry port from CI
//!
//! Updating a port means four steps against `{registry}/ports/{port}`:
//!
//! 1. set `version` in `vcpkg.json` ([`manifest`]),
//! 2. re-pin the `REF <sha> # CICD Replace` line in `portfile.cmake`
//!    ([`recipe`]),
//! 3. run `vcpkg format-manifest` ([`tool`]),
//! 4. run `vcpkg x-add-version --overwrite-version` ([`tool`]).
//!
//! [`runner::run`] sequences whichever subset the [`RunConfig`] selects and
//! stops at the first failure.
//!
//! # Safety
//!
//! - Inputs are validated before any file is written
//! - Atomic file writes (tempfile + fsync + rename)
//! - Port paths confined to the registry
//! - Zero or multiple reference lines fail instead of guessing
//! - Re-running with the same inputs is a no-op
//!
//! # Example
//!
//! ```no_run
//! use port_patcher::{run, ProcessInvoker, RunConfig};
//!
//! let config = RunConfig::new("/srv/vcpkg-registry", "zlib")
//!     .with_version("1.3.1")
//!     .with_git_sha("0123456789abcdef0123456789abcdef01234567");
//!
//! match run(&config, &ProcessInvoker) {
//!     Ok(report) => println!("updated {} in {} steps", report.port_name, report.steps.len()),
//!     Err(e) => eprintln!("update failed: {}", e),
//! }
//! ```

pub mod config;
pub mod edit;
pub mod error;
pub mod manifest;
pub mod recipe;
pub mod runner;
pub mod safety;
pub mod tool;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, FileConfig, Mode, RunConfig, Step};
pub use edit::{Edit, EditError, EditResult};
pub use error::PatchError;
pub use manifest::ManifestUpdate;
pub use recipe::{GitRef, RecipeUpdate};
pub use runner::{run, validate, RunError, RunReport, StepOutcome, StepReport};
pub use safety::RegistryGuard;
pub use tool::{Invocation, ProcessInvoker, ToolInvoker, ToolOutput};
