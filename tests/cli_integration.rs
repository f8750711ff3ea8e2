//! CLI tests: `run` and `check` against a copy of the fixture registry.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const NEW_SHA: &str = "51b7f2abdade71cd9bb0e7a373ef2610ec6f9daf";
const OLD_SHA: &str = "09155eaa2f9270dc4ed1fa13e2b4b2613e6e4851";

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn setup_registry() -> TempDir {
    let dir = TempDir::new().unwrap();
    copy_dir(
        &Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/registry"),
        dir.path(),
    );
    dir
}

fn port_patcher() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_port-patcher"));
    for var in [
        "INPUT_VCPKGREGISTRYPATH",
        "INPUT_PORTNAME",
        "INPUT_PORTVERSION",
        "INPUT_PORTGITSHA",
        "VCPKG_EXE",
        "GITHUB_ACTIONS",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn manifest(registry: &Path) -> String {
    fs::read_to_string(registry.join("ports/zlib/vcpkg.json")).unwrap()
}

fn recipe(registry: &Path) -> String {
    fs::read_to_string(registry.join("ports/zlib/portfile.cmake")).unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_lists_commands() {
    let output = port_patcher().arg("--help").output().unwrap();

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("run"));
    assert!(out.contains("check"));
}

#[test]
fn test_patch_mode_updates_files() {
    let registry = setup_registry();
    let original_manifest = manifest(registry.path());
    let original_recipe = recipe(registry.path());

    let output = port_patcher()
        .args(["run", "--mode", "patch", "--port-name", "zlib"])
        .arg("--registry-path")
        .arg(registry.path())
        .args(["--port-version", "1.3.1", "--port-git-sha", NEW_SHA])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        manifest(registry.path()),
        original_manifest.replace("\"1.3.0\"", "\"1.3.1\"")
    );
    let expected_recipe = original_recipe.replacen(OLD_SHA, NEW_SHA, 1);
    assert_eq!(recipe(registry.path()), expected_recipe);
    assert!(stdout(&output).contains("Port updated."));
}

#[test]
fn test_inputs_from_github_actions_environment() {
    let registry = setup_registry();

    let output = port_patcher()
        .args(["run", "--mode", "patch"])
        .env("INPUT_VCPKGREGISTRYPATH", registry.path())
        .env("INPUT_PORTNAME", "zlib")
        .env("INPUT_PORTVERSION", "2.0.0")
        .env("INPUT_PORTGITSHA", NEW_SHA)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(manifest(registry.path()).contains("\"version\": \"2.0.0\""));
}

#[test]
fn test_check_writes_nothing() {
    let registry = setup_registry();
    let original_manifest = manifest(registry.path());
    let original_recipe = recipe(registry.path());

    let output = port_patcher()
        .args(["check", "--port-name", "zlib"])
        .arg("--registry-path")
        .arg(registry.path())
        .args(["--port-version", "1.3.1", "--port-git-sha", NEW_SHA])
        .args(["--vcpkg", "/nonexistent/vcpkg"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("DRY RUN"));
    assert!(out.contains("would run"));
    assert_eq!(manifest(registry.path()), original_manifest);
    assert_eq!(recipe(registry.path()), original_recipe);
}

#[test]
fn test_missing_port_name_fails() {
    let registry = setup_registry();

    let output = port_patcher()
        .args(["run", "--mode", "patch", "--port-version", "1.3.1"])
        .args(["--port-git-sha", NEW_SHA])
        .arg("--registry-path")
        .arg(registry.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("portName is required"));
}

#[test]
fn test_github_actions_error_annotation() {
    let registry = setup_registry();

    let output = port_patcher()
        .args(["run", "--mode", "patch", "--port-name", "zlib"])
        .arg("--registry-path")
        .arg(registry.path())
        .args(["--port-version", "1.3.1", "--port-git-sha", "deadbeef"])
        .env("GITHUB_ACTIONS", "true")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("::error::portGitSHA has invalid shape"));
}

#[test]
fn test_config_file_supplies_defaults() {
    let registry = setup_registry();
    let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/port-patcher.toml");

    let output = port_patcher()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--registry-path")
        .arg(registry.path())
        .args(["--port-version", "1.4.0"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    // flag wins over the file's 1.3.1
    assert!(manifest(registry.path()).contains("\"version\": \"1.4.0\""));
    assert!(recipe(registry.path()).contains(&format!("REF {NEW_SHA} # CICD Replace")));
}

#[test]
fn test_empty_environment_input_falls_back_to_config_file() {
    let registry = setup_registry();
    let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/port-patcher.toml");

    let output = port_patcher()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--registry-path")
        .arg(registry.path())
        .env("INPUT_PORTNAME", "")
        .env("INPUT_PORTVERSION", "")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(manifest(registry.path()).contains("\"version\": \"1.3.1\""));
}

#[test]
fn test_mode_flag_overrides_config_file_steps() {
    let registry = setup_registry();
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("steps.toml");
    fs::write(
        &config,
        format!("port_name = \"zlib\"\nport_git_sha = \"{NEW_SHA}\"\nsteps = [\"update-recipe\"]\n"),
    )
    .unwrap();
    let original_recipe = recipe(registry.path());

    let output = port_patcher()
        .args(["check", "--mode", "patch", "--port-version", "9.9.9"])
        .arg("--config")
        .arg(&config)
        .arg("--registry-path")
        .arg(registry.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("update-manifest"));
    assert!(out.contains("update-recipe"));
    assert_eq!(recipe(registry.path()), original_recipe);
}

#[test]
fn test_bad_config_file_emits_error_annotation() {
    let registry = setup_registry();
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "mode = \"sideways\"\n").unwrap();

    let output = port_patcher()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--registry-path")
        .arg(registry.path())
        .env("GITHUB_ACTIONS", "true")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("::error::failed to parse config TOML"));
    assert!(stderr(&output).contains("bad.toml"));
}

#[cfg(unix)]
mod with_fake_vcpkg {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Shell stand-in for vcpkg that logs its arguments next to itself.
    fn install_fake_vcpkg(dir: &Path, fail_add_version: bool) -> std::path::PathBuf {
        let exit = if fail_add_version {
            "echo 'error: no version database entry' >&2; exit 1"
        } else {
            "echo 'added version'"
        };
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/calls.log\"\ncase \"$*\" in\n  *x-add-version*) {exit} ;;\n  *) echo 'formatted' ;;\nesac\n"
        );
        let path = dir.join("vcpkg");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_full_run_invokes_vcpkg_in_order() {
        let registry = setup_registry();
        let bin = TempDir::new().unwrap();
        let vcpkg = install_fake_vcpkg(bin.path(), false);

        let output = port_patcher()
            .args(["run", "--port-name", "zlib"])
            .arg("--registry-path")
            .arg(registry.path())
            .args(["--port-version", "1.3.1", "--port-git-sha", NEW_SHA])
            .arg("--vcpkg")
            .arg(&vcpkg)
            .output()
            .unwrap();

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        let log = fs::read_to_string(bin.path().join("calls.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("format-manifest "));
        assert!(lines[0].ends_with("ports/zlib/vcpkg.json"));
        assert!(lines[1].contains("x-add-version zlib --verbose --overwrite-version"));
        assert!(lines[1].contains("--x-builtin-registry-versions-dir="));
    }

    #[test]
    fn test_vcpkg_failure_fails_run() {
        let registry = setup_registry();
        let bin = TempDir::new().unwrap();
        let vcpkg = install_fake_vcpkg(bin.path(), true);

        let output = port_patcher()
            .args(["run", "--port-name", "zlib"])
            .arg("--registry-path")
            .arg(registry.path())
            .args(["--port-version", "1.3.1", "--port-git-sha", NEW_SHA])
            .arg("--vcpkg")
            .arg(&vcpkg)
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(1));
        let err = stderr(&output);
        assert!(err.contains("add-version"));
        assert!(err.contains("no version database entry"));
        assert!(err.contains("not been rolled back"));
        // the edits made before the failure stay
        assert!(manifest(registry.path()).contains("\"version\": \"1.3.1\""));
    }
}
