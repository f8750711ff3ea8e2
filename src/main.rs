use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use port_patcher::runner::PortPaths;
use port_patcher::{
    load_from_path, run, FileConfig, Mode, ProcessInvoker, RunConfig, RunError, RunReport, Step,
    StepOutcome,
};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "port-patcher")]
#[command(about = "Bump a vcpkg registry port: manifest version, portfile REF and version database", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the port
    Run {
        #[command(flatten)]
        inputs: Inputs,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Validate inputs and show the pending changes without writing or
    /// running vcpkg
    Check {
        #[command(flatten)]
        inputs: Inputs,
    },
}

/// Inputs may come from flags, from GitHub Actions `INPUT_*` variables, or
/// from a config file, in that order of precedence.
#[derive(Args)]
struct Inputs {
    /// Root of the vcpkg registry (contains ports/ and versions/)
    #[arg(long, env = "INPUT_VCPKGREGISTRYPATH")]
    registry_path: Option<PathBuf>,

    /// Port to update
    #[arg(long, env = "INPUT_PORTNAME")]
    port_name: Option<String>,

    /// New value for "version" in vcpkg.json
    #[arg(long, env = "INPUT_PORTVERSION")]
    port_version: Option<String>,

    /// New 40-character commit for the REF line in portfile.cmake
    #[arg(long, env = "INPUT_PORTGITSHA")]
    port_git_sha: Option<String>,

    /// vcpkg executable
    #[arg(long, env = "VCPKG_EXE")]
    vcpkg: Option<PathBuf>,

    /// Which steps to run
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Run only these steps (repeatable, overrides --mode)
    #[arg(long = "step", value_enum)]
    steps: Vec<Step>,

    /// TOML file providing defaults for any of the above
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Inputs {
    fn resolve(self) -> Result<RunConfig> {
        let base = match &self.config {
            Some(path) => load_from_path(path)?,
            None => FileConfig::default(),
        };
        let overrides = FileConfig {
            registry_path: self.registry_path,
            port_name: self.port_name,
            port_version: self.port_version,
            port_git_sha: self.port_git_sha,
            vcpkg: self.vcpkg,
            mode: self.mode,
            steps: (!self.steps.is_empty()).then_some(self.steps),
        };
        Ok(base.merge(overrides).into_run_config())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Run {
            inputs,
            dry_run,
            diff,
        } => cmd_run(resolve_or_exit(inputs).dry_run(dry_run), diff),
        Commands::Check { inputs } => cmd_run(resolve_or_exit(inputs).dry_run(true), true),
    }
}

/// Config file errors take the same failure path as run errors.
fn resolve_or_exit(inputs: Inputs) -> RunConfig {
    match inputs.resolve() {
        Ok(config) => config,
        Err(err) => {
            report_error(&err);
            std::process::exit(1);
        }
    }
}

fn cmd_run(config: RunConfig, show_diff: bool) -> Result<()> {
    info!(
        registry = %config.registry_path.display(),
        port = %config.port_name,
        version = config.port_version.as_deref().unwrap_or(""),
        git_sha = config.port_git_sha.as_deref().unwrap_or(""),
        "inputs"
    );

    println!("Registry: {}", config.registry_path.display());
    println!("Port: {}", config.port_name);
    if config.dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
    }
    println!();

    // Snapshot the port files so `--diff` can show what a real run changed.
    let paths = PortPaths::new(&config.registry_path, &config.port_name);
    let before: Vec<(PathBuf, String)> = if show_diff && !config.dry_run {
        [&paths.manifest, &paths.recipe]
            .into_iter()
            .filter_map(|p| fs::read_to_string(p).ok().map(|c| (p.clone(), c)))
            .collect()
    } else {
        Vec::new()
    };

    match run(&config, &ProcessInvoker) {
        Ok(report) => {
            print_report(&report, show_diff);
            for (file, original) in &before {
                if let Ok(after) = fs::read_to_string(file) {
                    if &after != original {
                        display_diff(file, original, &after);
                    }
                }
            }
            println!();
            println!("{}", "Port updated.".green().bold());
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &RunReport, show_diff: bool) {
    for entry in &report.steps {
        let glyph = match &entry.outcome {
            StepOutcome::Skipped { .. } => "⊘".cyan(),
            outcome if !outcome.changed() => "⊙".yellow(),
            _ => "✓".green(),
        };
        println!("{} {}: {}", glyph, entry.step, entry.outcome);

        if let StepOutcome::Tool { output, .. } = &entry.outcome {
            for line in output.stdout.lines() {
                println!("    {}", line.dimmed());
            }
        }

        if show_diff {
            if let StepOutcome::Planned {
                file,
                before,
                after,
            } = &entry.outcome
            {
                if before != after {
                    display_diff(file, before, after);
                }
            }
        }
    }
}

fn report_failure(err: &RunError) {
    for entry in &err.completed {
        println!("{} {}: {}", "✓".green(), entry.step, entry.outcome);
    }
    report_error(err);
    if err.completed.iter().any(|s| s.outcome.changed()) {
        eprintln!(
            "  {}",
            "Earlier steps were applied and have not been rolled back.".yellow()
        );
    }
}

/// Print the failure line, plus a workflow annotation under GitHub Actions.
fn report_error(err: &dyn Display) {
    let message = err.to_string();
    eprintln!("{} {}", "✗".red(), message.red());

    // GitHub Actions picks up workflow commands from stdout.
    if env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true") {
        println!("::error::{}", escape_workflow_data(&message));
    }
}

/// Escape a message for a `::error::` workflow command.
fn escape_workflow_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", line);
        if change.missing_newline() {
            println!();
        }
    }
}
