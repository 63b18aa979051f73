//! Shared test utilities for dockside CLI tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Environment variables that must not leak from the developer's shell
const ISOLATED_VARS: &[&str] = &[
    "DOCKSIDE_LOG",
    "DOCKSIDE_LOG_FORMAT",
    "DOCKSIDE_RUNTIME",
    "DOCKSIDE_PREFIX",
    "DOCKSIDE_DEFAULT_ENVIRONMENT",
    "DOCKSIDE_EDITOR",
    "DOCKSIDE_SETTLE_MS",
    "REMOTE_CONTAINERS",
    "WSL_DISTRO_NAME",
    "RUST_LOG",
];

/// Scratch directory with a settings file and isolated session state
pub struct Sandbox {
    pub temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let sandbox = Self {
            temp: TempDir::new().unwrap(),
        };
        sandbox.write_settings("");
        sandbox
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root().join("settings.toml")
    }

    pub fn session_path(&self) -> PathBuf {
        self.root().join("session.json")
    }

    pub fn attach_config_dir(&self) -> PathBuf {
        self.root().join("attach-configs")
    }

    /// Write the settings file; `extra` is appended as raw TOML
    pub fn write_settings(&self, extra: &str) {
        let content = format!(
            "settle_ms = 0\ncleanup_margin_ms = 0\nattach_config_dir = \"{}\"\nsession_file = \"{}\"\n{}",
            self.attach_config_dir().display(),
            self.session_path().display(),
            extra
        );
        fs::write(self.settings_path(), content).unwrap();
    }

    pub fn folder(&self, name: &str) -> PathBuf {
        let folder = self.root().join(name);
        fs::create_dir_all(&folder).unwrap();
        folder
    }

    pub fn bound_folder(&self, name: &str, environment: &str) -> PathBuf {
        let folder = self.folder(name);
        fs::write(
            folder.join(".devcontainer.json"),
            format!(r#"{{ "name": "{}" }}"#, environment),
        )
        .unwrap();
        folder
    }

    pub fn session(&self) -> serde_json::Value {
        fs::read_to_string(self.session_path())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    /// `dockside` with the sandbox settings and a clean environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("dockside").unwrap();
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd.arg("--settings").arg(self.settings_path());
        cmd.arg("--log-level").arg("warn");
        cmd
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Fake container runtime and editor scripts recording their invocations
#[cfg(unix)]
pub struct FakeTools {
    pub runtime: PathBuf,
    pub editor: PathBuf,
    pub runtime_log: PathBuf,
    pub editor_log: PathBuf,
    /// Attach configs the editor found while it was running
    pub configs_log: PathBuf,
}

#[cfg(unix)]
impl FakeTools {
    /// `ps_lines` are the JSON lines `ps` prints; names in `failing_stops` make
    /// `stop` exit non-zero
    pub fn install(sandbox: &Sandbox, ps_lines: &[&str], failing_stops: &[&str]) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let bin = sandbox.root().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let runtime_log = sandbox.root().join("runtime.log");
        let editor_log = sandbox.root().join("editor.log");
        let configs_log = sandbox.root().join("configs.log");
        let ps_file = bin.join("ps.out");
        fs::write(&ps_file, ps_lines.join("\n")).unwrap();

        let failing = failing_stops.join(" ");
        let runtime = bin.join("fake-docker");
        fs::write(
            &runtime,
            format!(
                r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1" in
  ps) cat "{ps}" ;;
  inspect) echo "Error: No such object: $6" >&2; exit 1 ;;
  stop)
    for f in {failing}; do
      if [ "$f" = "$2" ]; then echo "Error response from daemon: cannot stop $2" >&2; exit 1; fi
    done
    ;;
esac
exit 0
"#,
                log = runtime_log.display(),
                ps = ps_file.display(),
                failing = failing,
            ),
        )
        .unwrap();

        let editor = bin.join("fake-code");
        fs::write(
            &editor,
            format!(
                r#"#!/bin/sh
echo "$@" >> "{log}"
for f in "{configs}"/*.json; do
  [ -f "$f" ] && basename "$f" >> "{seen}"
done
exit 0
"#,
                log = editor_log.display(),
                configs = sandbox.attach_config_dir().display(),
                seen = configs_log.display(),
            ),
        )
        .unwrap();

        for script in [&runtime, &editor] {
            fs::set_permissions(script, fs::Permissions::from_mode(0o755)).unwrap();
        }

        sandbox.write_settings(&format!(
            "runtime_path = \"{}\"\neditor_command = \"{}\"\n",
            runtime.display(),
            editor.display()
        ));

        Self {
            runtime,
            editor,
            runtime_log,
            editor_log,
            configs_log,
        }
    }

    pub fn runtime_calls(&self) -> Vec<String> {
        read_lines(&self.runtime_log)
    }

    pub fn editor_calls(&self) -> Vec<String> {
        read_lines(&self.editor_log)
    }

    pub fn configs_seen_by_editor(&self) -> Vec<String> {
        read_lines(&self.configs_log)
    }

    pub fn stopped(&self) -> Vec<String> {
        self.runtime_calls()
            .into_iter()
            .filter_map(|line| line.strip_prefix("stop ").map(str::to_string))
            .collect()
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// One `docker ps --format '{{json .}}'` line
pub fn ps_line(name: &str, state: &str) -> String {
    format!(
        r#"{{"Names":"{}","State":"{}","Image":"dockside/base:latest"}}"#,
        name, state
    )
}
