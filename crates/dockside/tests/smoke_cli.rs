//! CLI-only smoke tests that need neither a container runtime nor an editor.

mod support;

use predicates::prelude::*;
use std::fs;
use support::Sandbox;

#[test]
fn smoke_help_lists_subcommands() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("attach")
                .and(predicate::str::contains("detach"))
                .and(predicate::str::contains("switch"))
                .and(predicate::str::contains("stop"))
                .and(predicate::str::contains("status"))
                .and(predicate::str::contains("init")),
        );
}

#[test]
fn smoke_version() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("dockside "));
}

#[test]
fn smoke_no_subcommand_prints_hint() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("dockside --help"));
}

#[test]
fn smoke_init_generates_descriptors() {
    let sandbox = Sandbox::new();
    let folder = sandbox.folder("fresh");

    sandbox
        .command()
        .arg("init")
        .arg(&folder)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated descriptors"));

    let env: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(folder.join(".devcontainer.json")).unwrap())
            .unwrap();
    assert_eq!(env["name"], "dockside-latest");
    assert_eq!(env["createdBy"], "dockside");

    let ws: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(folder.join("fresh.code-workspace")).unwrap())
            .unwrap();
    assert_eq!(ws["metadata"]["createdBy"], "dockside");
    assert_eq!(ws["metadata"]["environmentVersion"], "dockside-latest");
}

#[test]
fn smoke_init_respects_default_environment_override() {
    let sandbox = Sandbox::new();
    let folder = sandbox.folder("fresh");

    sandbox
        .command()
        .env("DOCKSIDE_DEFAULT_ENVIRONMENT", "dockside-v9")
        .arg("init")
        .arg(&folder)
        .assert()
        .success();

    let env = fs::read_to_string(folder.join(".devcontainer.json")).unwrap();
    assert!(env.contains("\"dockside-v9\""));
}

#[test]
fn smoke_init_keeps_hand_written_descriptor() {
    let sandbox = Sandbox::new();
    let folder = sandbox.bound_folder("project", "custom-env");
    let before = fs::read_to_string(folder.join(".devcontainer.json")).unwrap();

    sandbox
        .command()
        .arg("init")
        .arg(&folder)
        .assert()
        .success()
        .stdout(predicate::str::contains("already bound to custom-env"));

    assert_eq!(
        fs::read_to_string(folder.join(".devcontainer.json")).unwrap(),
        before
    );
}

#[test]
fn smoke_init_missing_folder_fails_with_exit_1() {
    let sandbox = Sandbox::new();

    sandbox
        .command()
        .arg("init")
        .arg(sandbox.root().join("missing"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No workspace folder"));
}

#[test]
fn smoke_malformed_settings_file_is_an_error() {
    let sandbox = Sandbox::new();
    fs::write(sandbox.settings_path(), "settle_ms = \"soon\"\n").unwrap();

    sandbox
        .command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("settings"));
}

#[test]
fn smoke_status_without_runtime_fails() {
    let sandbox = Sandbox::new();

    sandbox
        .command()
        .arg("--runtime")
        .arg(sandbox.root().join("no-such-runtime"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not installed"));
}
