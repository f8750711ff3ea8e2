//! Port update orchestration.
//!
//! A run validates every input up front, then executes the selected steps
//! in order and stops at the first failure. Earlier steps are not rolled
//! back: if `add-version` fails after both files were patched, the patched
//! files stay on disk and the run reports the failure.

use crate::config::{ConfigError, RunConfig, Step};
use crate::edit::EditResult;
use crate::error::{require, PatchError};
use crate::manifest::{self, ManifestUpdate, MANIFEST_FILE};
use crate::recipe::{self, GitRef, RecipeUpdate, RECIPE_FILE};
use crate::safety::{check_port_name, RegistryGuard};
use crate::tool::{self, Invocation, ToolInvoker, ToolOutput};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Resolved files of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPaths {
    pub registry_root: PathBuf,
    pub port_dir: PathBuf,
    pub manifest: PathBuf,
    pub recipe: PathBuf,
}

impl PortPaths {
    /// `{registry}/ports/{port}/...` without touching the file system.
    pub fn new(registry_root: &Path, port_name: &str) -> Self {
        let port_dir = registry_root.join("ports").join(port_name);
        Self {
            registry_root: registry_root.to_path_buf(),
            manifest: port_dir.join(MANIFEST_FILE),
            recipe: port_dir.join(RECIPE_FILE),
            port_dir,
        }
    }
}

/// Inputs after validation; building one performs no writes.
#[derive(Debug, Clone)]
pub struct ValidatedRun {
    pub registry: RegistryGuard,
    pub paths: PortPaths,
    pub port_name: String,
    pub version: Option<String>,
    pub git_ref: Option<GitRef>,
    pub steps: Vec<Step>,
    pub vcpkg: PathBuf,
    pub dry_run: bool,
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Manifest(ManifestUpdate),
    Recipe(RecipeUpdate),
    Tool {
        invocation: Invocation,
        output: ToolOutput,
    },
    /// Dry run: the file would change from `before` to `after`
    Planned {
        file: PathBuf,
        before: String,
        after: String,
    },
    /// Dry run: the command that would have been spawned
    Skipped { invocation: Invocation },
}

impl StepOutcome {
    /// `false` when the step found nothing to change.
    pub fn changed(&self) -> bool {
        match self {
            StepOutcome::Manifest(update) => matches!(update.result, EditResult::Applied { .. }),
            StepOutcome::Recipe(update) => matches!(update.result, EditResult::Applied { .. }),
            StepOutcome::Planned { before, after, .. } => before != after,
            StepOutcome::Tool { .. } | StepOutcome::Skipped { .. } => true,
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Manifest(update) => match &update.result {
                EditResult::Applied { .. } => write!(
                    f,
                    "{}: {} set to {}",
                    update.file.display(),
                    update.field,
                    update.value
                ),
                EditResult::AlreadyApplied { .. } => write!(
                    f,
                    "{}: {} already {}",
                    update.file.display(),
                    update.field,
                    update.value
                ),
            },
            StepOutcome::Recipe(update) => match &update.result {
                EditResult::Applied { .. } => write!(
                    f,
                    "{}: REF {} -> {}",
                    update.file.display(),
                    update.previous,
                    update.git_ref
                ),
                EditResult::AlreadyApplied { .. } => write!(
                    f,
                    "{}: REF already {}",
                    update.file.display(),
                    update.git_ref
                ),
            },
            StepOutcome::Tool { invocation, .. } => write!(f, "ran {}", invocation),
            StepOutcome::Planned {
                file,
                before,
                after,
            } => {
                if before == after {
                    write!(f, "{}: no change", file.display())
                } else {
                    write!(f, "{}: would change", file.display())
                }
            }
            StepOutcome::Skipped { invocation } => write!(f, "would run {}", invocation),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub port_name: String,
    pub paths: PortPaths,
    pub steps: Vec<StepReport>,
}

/// A failed run: the first error plus whatever completed before it.
#[derive(Debug)]
pub struct RunError {
    /// Failing step, `None` if validation failed
    pub step: Option<Step>,
    /// Steps that finished before the failure; their effects persist
    pub completed: Vec<StepReport>,
    pub source: PatchError,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "{}: {}", step, self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl RunError {
    fn validation(source: PatchError) -> Self {
        Self {
            step: None,
            completed: Vec::new(),
            source,
        }
    }
}

/// Check every input the selected steps need, without writing anything.
///
/// Order: required arguments, value shapes, port name, then file
/// existence inside the registry.
pub fn validate(config: &RunConfig) -> Result<ValidatedRun, PatchError> {
    if config.registry_path.as_os_str().is_empty() {
        return Err(PatchError::MissingArgument {
            name: "registryPath",
        });
    }
    require("portName", &config.port_name)?;
    if config.steps.is_empty() {
        return Err(ConfigError::Validation {
            path: None,
            message: "no steps selected".to_string(),
        }
        .into());
    }

    let version = if config.has_step(Step::UpdateManifest) {
        let version = config.port_version.as_deref().unwrap_or_default();
        Some(require("portVersion", version)?.to_string())
    } else {
        None
    };
    let sha = if config.has_step(Step::UpdateRecipe) {
        let sha = config.port_git_sha.as_deref().unwrap_or_default();
        Some(require("portGitSHA", sha)?)
    } else {
        None
    };

    let git_ref = sha.map(GitRef::parse).transpose()?;
    check_port_name(&config.port_name)?;

    let guard = RegistryGuard::new(&config.registry_path)?;
    let port_dir = guard.port_dir(&config.port_name)?;
    let mut paths = PortPaths::new(guard.registry_root(), &config.port_name);
    paths.port_dir = port_dir;

    let needs_manifest = config.has_step(Step::UpdateManifest) || config.has_step(Step::FormatManifest);
    if needs_manifest {
        paths.manifest = guard.validate_path(&paths.manifest)?;
    }
    if config.has_step(Step::UpdateRecipe) {
        paths.recipe = guard.validate_path(&paths.recipe)?;
    }

    Ok(ValidatedRun {
        registry: guard,
        paths,
        port_name: config.port_name.clone(),
        version,
        git_ref,
        steps: config.steps.clone(),
        vcpkg: config.vcpkg.clone(),
        dry_run: config.dry_run,
    })
}

/// Validate `config`, then execute its steps in order, stopping at the
/// first failure.
pub fn run(config: &RunConfig, invoker: &dyn ToolInvoker) -> Result<RunReport, RunError> {
    let plan = validate(config).map_err(|source| {
        error!(kind = source.kind(), error = %source, "validation failed");
        RunError::validation(source)
    })?;

    info!(
        port = %plan.port_name,
        registry = %plan.paths.registry_root.display(),
        steps = ?plan.steps,
        dry_run = plan.dry_run,
        "updating port"
    );

    let mut completed = Vec::with_capacity(plan.steps.len());
    for &step in &plan.steps {
        match execute_step(&plan, step, invoker) {
            Ok(outcome) => {
                info!(step = %step, changed = outcome.changed(), "{}", outcome);
                completed.push(StepReport { step, outcome });
            }
            Err(source) => {
                error!(step = %step, kind = source.kind(), error = %source, "step failed");
                return Err(RunError {
                    step: Some(step),
                    completed,
                    source,
                });
            }
        }
    }

    Ok(RunReport {
        port_name: plan.port_name,
        paths: plan.paths,
        steps: completed,
    })
}

fn execute_step(
    plan: &ValidatedRun,
    step: Step,
    invoker: &dyn ToolInvoker,
) -> Result<StepOutcome, PatchError> {
    let paths = &plan.paths;
    match step {
        Step::UpdateManifest => {
            let version = plan
                .version
                .as_deref()
                .ok_or(PatchError::MissingArgument { name: "portVersion" })?;
            if plan.dry_run {
                let before = read(&paths.manifest)?;
                let after =
                    manifest::render(&paths.manifest, &before, manifest::VERSION_FIELD, version)?
                        .content;
                return Ok(StepOutcome::Planned {
                    file: paths.manifest.clone(),
                    before,
                    after,
                });
            }
            Ok(StepOutcome::Manifest(manifest::update_version(
                &paths.manifest,
                version,
            )?))
        }
        Step::UpdateRecipe => {
            let git_ref = plan
                .git_ref
                .as_ref()
                .ok_or(PatchError::MissingArgument { name: "portGitSHA" })?;
            if plan.dry_run {
                let before = read(&paths.recipe)?;
                let after = recipe::plan_ref(&paths.recipe, &before, git_ref)?.splice(&before)?;
                return Ok(StepOutcome::Planned {
                    file: paths.recipe.clone(),
                    before,
                    after,
                });
            }
            Ok(StepOutcome::Recipe(recipe::replace_ref(
                &paths.recipe,
                git_ref.as_str(),
            )?))
        }
        Step::FormatManifest => invoke(
            plan,
            tool::format_manifest(&plan.vcpkg, &paths.registry_root, &paths.manifest),
            invoker,
        ),
        Step::AddVersion => invoke(
            plan,
            tool::add_version(&plan.vcpkg, &plan.registry, &plan.port_name),
            invoker,
        ),
    }
}

fn invoke(
    plan: &ValidatedRun,
    invocation: Invocation,
    invoker: &dyn ToolInvoker,
) -> Result<StepOutcome, PatchError> {
    if plan.dry_run {
        return Ok(StepOutcome::Skipped { invocation });
    }
    let output = invoker.invoke(&invocation)?;
    Ok(StepOutcome::Tool { invocation, output })
}

fn read(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|e| PatchError::io(path, e))
}
