//! External tool invocation.
//!
//! The runner never spawns processes directly; it hands an [`Invocation`] to
//! a [`ToolInvoker`]. [`ProcessInvoker`] runs it for real, tests substitute
//! a recording fake.

use crate::error::PatchError;
use crate::safety::RegistryGuard;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// A fully spelled-out command line. Arguments are passed as a vector, no
/// shell is involved, so paths with spaces need no quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `--flag=value`
    pub fn flag_value(self, flag: &str, value: &Path) -> Self {
        let mut arg = OsString::from(flag);
        arg.push("=");
        arg.push(value.as_os_str());
        self.arg(arg)
    }

    /// Subcommand name for logs: first argument not starting with `-`.
    pub fn subcommand(&self) -> Option<&str> {
        self.args
            .iter()
            .filter_map(|a| a.to_str())
            .find(|a| !a.starts_with('-'))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one command to completion. No retries, no timeout.
pub trait ToolInvoker {
    fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, PatchError>;
}

impl<T: ToolInvoker + ?Sized> ToolInvoker for &T {
    fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, PatchError> {
        (**self).invoke(invocation)
    }
}

/// [`ToolInvoker`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl ToolInvoker for ProcessInvoker {
    fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, PatchError> {
        debug!(command = %invocation, cwd = %invocation.cwd.display(), "spawning process");

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| PatchError::ExternalToolFailure {
                command: invocation.to_string(),
                reason: format!("failed to spawn: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            if !stdout.trim().is_empty() {
                debug!(stdout = %stdout.trim_end(), "command stdout");
            }
            let code = match output.status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            let reason = if stderr.trim().is_empty() {
                code
            } else {
                format!("{code}: {}", stderr.trim_end())
            };
            return Err(PatchError::ExternalToolFailure {
                command: invocation.to_string(),
                reason,
            });
        }

        if !stderr.trim().is_empty() {
            warn!(command = %invocation, stderr = %stderr.trim_end(), "command succeeded with stderr output");
        }
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim_end(), "command output");
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// `vcpkg format-manifest <manifest>`, run from the registry root.
pub fn format_manifest(vcpkg: &Path, registry_root: &Path, manifest: &Path) -> Invocation {
    Invocation::new(vcpkg, registry_root)
        .arg("format-manifest")
        .arg(manifest.as_os_str())
}

/// `vcpkg x-add-version <port> --overwrite-version` against the registry's
/// own ports and versions directories, run from the registry root.
///
/// Overwrite mode makes re-registering the same version idempotent.
pub fn add_version(vcpkg: &Path, registry: &RegistryGuard, port_name: &str) -> Invocation {
    Invocation::new(vcpkg, registry.registry_root())
        .flag_value("--x-builtin-ports-root", &registry.ports_root())
        .flag_value(
            "--x-builtin-registry-versions-dir",
            &registry.versions_root(),
        )
        .arg("x-add-version")
        .arg(port_name)
        .arg("--verbose")
        .arg("--overwrite-version")
}
