use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// One unit of work in a port update.
///
/// Variant order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Set `version` in `ports/<port>/vcpkg.json`
    UpdateManifest,
    /// Re-pin `REF <sha> # CICD Replace` in `ports/<port>/portfile.cmake`
    UpdateRecipe,
    /// `vcpkg format-manifest`
    FormatManifest,
    /// `vcpkg x-add-version --overwrite-version`
    AddVersion,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::UpdateManifest,
        Step::UpdateRecipe,
        Step::FormatManifest,
        Step::AddVersion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::UpdateManifest => "update-manifest",
            Step::UpdateRecipe => "update-recipe",
            Step::FormatManifest => "format-manifest",
            Step::AddVersion => "add-version",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Preset step selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Patch both files, then format and register the version
    #[default]
    Full,
    /// Patch manifest and recipe only
    Patch,
    /// Format the manifest and register the version only
    Register,
}

impl Mode {
    pub fn steps(self) -> Vec<Step> {
        match self {
            Mode::Full => Step::ALL.to_vec(),
            Mode::Patch => vec![Step::UpdateManifest, Step::UpdateRecipe],
            Mode::Register => vec![Step::FormatManifest, Step::AddVersion],
        }
    }
}

/// Contents of an optional `--config` TOML file. Every key may also come
/// from the command line or environment, which take precedence.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
    #[serde(default)]
    pub port_name: Option<String>,
    #[serde(default)]
    pub port_version: Option<String>,
    #[serde(default)]
    pub port_git_sha: Option<String>,
    /// vcpkg executable, `vcpkg` on PATH if unset
    #[serde(default)]
    pub vcpkg: Option<PathBuf>,
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Explicit step list, overrides `mode`
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
}

impl FileConfig {
    /// Layer `overrides` on top of `self`; set values in `overrides` win.
    ///
    /// Blank strings and empty paths count as unset on both sides. A `mode`
    /// in `overrides` without its own `steps` discards the base's `steps`.
    pub fn merge(self, overrides: FileConfig) -> FileConfig {
        let base = self.without_blanks();
        let overrides = overrides.without_blanks();
        let steps = match (overrides.steps, overrides.mode) {
            (Some(steps), _) => Some(steps),
            (None, Some(_)) => None,
            (None, None) => base.steps,
        };
        FileConfig {
            registry_path: overrides.registry_path.or(base.registry_path),
            port_name: overrides.port_name.or(base.port_name),
            port_version: overrides.port_version.or(base.port_version),
            port_git_sha: overrides.port_git_sha.or(base.port_git_sha),
            vcpkg: overrides.vcpkg.or(base.vcpkg),
            mode: overrides.mode.or(base.mode),
            steps,
        }
    }

    fn without_blanks(self) -> FileConfig {
        FileConfig {
            registry_path: self.registry_path.filter(|p| !p.as_os_str().is_empty()),
            port_name: self.port_name.filter(|s| !s.trim().is_empty()),
            port_version: self.port_version.filter(|s| !s.trim().is_empty()),
            port_git_sha: self.port_git_sha.filter(|s| !s.trim().is_empty()),
            vcpkg: self.vcpkg.filter(|p| !p.as_os_str().is_empty()),
            mode: self.mode,
            steps: self.steps,
        }
    }

    pub fn into_run_config(self) -> RunConfig {
        let steps = match self.steps {
            Some(steps) => steps,
            None => self.mode.unwrap_or_default().steps(),
        };
        RunConfig {
            registry_path: self.registry_path.unwrap_or_default(),
            port_name: self.port_name.unwrap_or_default(),
            port_version: self.port_version.filter(|v| !v.trim().is_empty()),
            port_git_sha: self.port_git_sha.filter(|v| !v.trim().is_empty()),
            vcpkg: self.vcpkg.unwrap_or_else(|| PathBuf::from("vcpkg")),
            steps: normalize_steps(steps),
            dry_run: false,
        }
    }
}

/// Everything one run needs. Built once from CLI, environment and config
/// file, then passed to [`crate::runner::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub registry_path: PathBuf,
    pub port_name: String,
    pub port_version: Option<String>,
    pub port_git_sha: Option<String>,
    pub vcpkg: PathBuf,
    /// Deduplicated, in execution order
    pub steps: Vec<Step>,
    /// Compute file changes without writing; skip external tools
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(registry_path: impl Into<PathBuf>, port_name: impl Into<String>) -> Self {
        Self {
            registry_path: registry_path.into(),
            port_name: port_name.into(),
            port_version: None,
            port_git_sha: None,
            vcpkg: PathBuf::from("vcpkg"),
            steps: Mode::Full.steps(),
            dry_run: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.port_version = Some(version.into());
        self
    }

    pub fn with_git_sha(mut self, sha: impl Into<String>) -> Self {
        self.port_git_sha = Some(sha.into());
        self
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps = normalize_steps(steps.into_iter().collect());
        self
    }

    pub fn with_mode(self, mode: Mode) -> Self {
        self.with_steps(mode.steps())
    }

    pub fn with_vcpkg(mut self, vcpkg: impl Into<PathBuf>) -> Self {
        self.vcpkg = vcpkg.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn has_step(&self, step: Step) -> bool {
        self.steps.contains(&step)
    }
}

fn normalize_steps(mut steps: Vec<Step>) -> Vec<Step> {
    steps.sort();
    steps.dedup();
    steps
}
