//! Container runtime client
//!
//! Wraps the container CLI (`docker` or `podman`) for the handful of operations the
//! transition engine needs: list prefixed environments, inspect, start, stop, and
//! build the URI the editor attaches with. Every list call shells out; nothing is
//! cached because other actors can start or stop environments between calls.

use crate::errors::{Result, RuntimeError, TransitionError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, instrument, warn};

static ENVIRONMENT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("valid regex"));

/// Validate an environment (container) name before it reaches the CLI
pub fn validate_environment_name(name: &str) -> Result<()> {
    if ENVIRONMENT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(RuntimeError::InvalidName {
            name: name.to_string(),
            reason: "must start with an alphanumeric character and contain only alphanumerics, '_', '.' or '-'".to_string(),
        }
        .into())
    }
}

/// Observed lifecycle status of an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Running,
    Exited,
    Other(String),
}

impl From<&str> for EnvironmentStatus {
    fn from(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "running" => Self::Running,
            "exited" => Self::Exited,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// An environment as reported by the runtime at the moment of the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningEnvironment {
    pub name: String,
    pub status: EnvironmentStatus,
    pub image: String,
}

impl RunningEnvironment {
    pub fn new(name: impl Into<String>, status: EnvironmentStatus, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            image: image.into(),
        }
    }

    /// Suffix of the name after `prefix`, e.g. `v2` for `dockside-v2`
    pub fn version_tag<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        version_tag(&self.name, prefix)
    }

    pub fn is_running(&self) -> bool {
        self.status == EnvironmentStatus::Running
    }
}

/// Suffix of `name` after `prefix`, if it carries the prefix
pub fn version_tag<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)
}

/// URI handed to the editor's attach primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUri {
    /// Remote authority (`wsl+Ubuntu`), absent when attaching natively
    pub authority: Option<String>,
    /// Workspace-namespace path
    pub path: PathBuf,
}

impl fmt::Display for AttachUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.authority {
            Some(authority) => write!(f, "vscode-remote://{}{}", authority, self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// How the editor reaches the namespace containers run in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachBridge {
    /// Containers run in the editor's own namespace
    Native,
    /// Containers run inside a WSL distro that must be named in the URI
    Wsl {
        /// Fallback distro when none can be discovered
        default_distro: Option<String>,
    },
}

impl AttachBridge {
    pub fn for_platform(platform: crate::paths::Platform, default_distro: Option<String>) -> Self {
        use crate::paths::Platform;
        match platform {
            Platform::Windows | Platform::Wsl => Self::Wsl { default_distro },
            Platform::Linux | Platform::MacOS => Self::Native,
        }
    }
}

/// Decode `wsl.exe -l -q` output, which is UTF-16LE on most Windows builds
pub fn decode_distro_list(raw: &[u8]) -> Vec<String> {
    let text = if raw.len() >= 2 && raw.iter().skip(1).step_by(2).all(|b| *b == 0) {
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    };

    text.lines()
        .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pick the distro for a WSL attach URI.
///
/// Order: the distro the process runs in, the first listed distro, the
/// configured default. Substituting the default is logged.
pub fn resolve_distro(
    current: Option<String>,
    listed: &[String],
    default_distro: Option<&str>,
) -> Result<String> {
    if let Some(distro) = current.filter(|d| !d.trim().is_empty()) {
        debug!(distro = %distro, "Using distro from WSL_DISTRO_NAME");
        return Ok(distro);
    }

    if let Some(distro) = listed.first() {
        debug!(distro = %distro, "Using first listed WSL distro");
        return Ok(distro.clone());
    }

    if let Some(distro) = default_distro {
        warn!(
            distro = %distro,
            "Could not discover a WSL distro, falling back to configured default"
        );
        return Ok(distro.to_string());
    }

    Err(TransitionError::BridgeResolution {
        message: "no WSL distro found and no default distro configured".to_string(),
    }
    .into())
}

/// Container runtime operations used by the transition engine
#[allow(async_fn_in_trait)]
pub trait RuntimeClient {
    /// Environments whose name starts with `name_prefix`, in any state
    async fn list_environments(&self, name_prefix: &str) -> Result<Vec<RunningEnvironment>>;

    /// Inspect a single environment by exact name
    async fn inspect(&self, name: &str) -> Result<Option<RunningEnvironment>>;

    /// Start a stopped environment
    async fn start(&self, name: &str) -> Result<()>;

    /// Stop an environment. Fails with `TransitionError::EnvironmentStop`.
    async fn stop(&self, name: &str) -> Result<()>;

    /// URI the editor should attach to for a workspace-namespace path
    async fn attach_uri(&self, workspace_path: &Path) -> Result<AttachUri>;
}

impl<T: RuntimeClient> RuntimeClient for &T {
    async fn list_environments(&self, name_prefix: &str) -> Result<Vec<RunningEnvironment>> {
        (*self).list_environments(name_prefix).await
    }

    async fn inspect(&self, name: &str) -> Result<Option<RunningEnvironment>> {
        (*self).inspect(name).await
    }

    async fn start(&self, name: &str) -> Result<()> {
        (*self).start(name).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        (*self).stop(name).await
    }

    async fn attach_uri(&self, workspace_path: &Path) -> Result<AttachUri> {
        (*self).attach_uri(workspace_path).await
    }
}

struct CommandOutput {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

async fn run_command(program: String, args: Vec<String>) -> Result<CommandOutput> {
    tokio::task::spawn_blocking(move || {
        debug!("Executing: {} {}", program, args.join(" "));
        let output = Command::new(&program).args(&args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::NotInstalled
            } else {
                RuntimeError::Cli(format!("Failed to execute {}: {}", program, e))
            }
        })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    })
    .await
    .map_err(|e| RuntimeError::Cli(format!("Task join error: {}", e)))?
}

/// Parse `ps --format '{{json .}}'` output, one JSON object per line
pub fn parse_environment_list(output: &str) -> Result<Vec<RunningEnvironment>> {
    let mut environments = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| RuntimeError::Cli(format!("Failed to parse container JSON: {}", e)))?;

        let field = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string()
        };

        // Names may be comma separated when a container has aliases
        let names = field("Names");
        let name = names.split(',').next().unwrap_or("").trim().to_string();
        environments.push(RunningEnvironment {
            name,
            status: EnvironmentStatus::from(field("State").as_str()),
            image: field("Image"),
        });
    }
    Ok(environments)
}

/// CLI-backed runtime client, usable with docker or podman
#[derive(Debug, Clone)]
pub struct CliRuntime {
    runtime_path: String,
    bridge: AttachBridge,
    wsl_path: String,
}

impl CliRuntime {
    pub fn new(runtime_path: impl Into<String>, bridge: AttachBridge) -> Self {
        Self {
            runtime_path: runtime_path.into(),
            bridge,
            wsl_path: "wsl.exe".to_string(),
        }
    }

    pub fn runtime_path(&self) -> &str {
        &self.runtime_path
    }

    async fn runtime(&self, args: &[&str]) -> Result<CommandOutput> {
        run_command(
            self.runtime_path.clone(),
            args.iter().map(|s| s.to_string()).collect(),
        )
        .await
    }

    async fn listed_distros(&self) -> Vec<String> {
        match run_command(self.wsl_path.clone(), vec!["-l".into(), "-q".into()]).await {
            Ok(output) if output.success => decode_distro_list(&output.stdout),
            Ok(output) => {
                debug!("wsl distro listing failed: {}", output.stderr);
                Vec::new()
            }
            Err(e) => {
                debug!("wsl distro listing unavailable: {}", e);
                Vec::new()
            }
        }
    }
}

impl RuntimeClient for CliRuntime {
    #[instrument(skip(self))]
    async fn list_environments(&self, name_prefix: &str) -> Result<Vec<RunningEnvironment>> {
        let filter = format!("name={}", name_prefix);
        let output = self
            .runtime(&["ps", "--all", "--filter", &filter, "--format", "{{json .}}"])
            .await?;

        if !output.success {
            return Err(RuntimeError::Cli(format!("Container list failed: {}", output.stderr)).into());
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| RuntimeError::Cli(format!("Invalid UTF-8 in runtime output: {}", e)))?;

        // The name filter matches substrings; keep only true prefix matches
        let environments: Vec<_> = parse_environment_list(&stdout)?
            .into_iter()
            .filter(|env| env.name.starts_with(name_prefix))
            .collect();
        debug!("Found {} environments with prefix {}", environments.len(), name_prefix);
        Ok(environments)
    }

    #[instrument(skip(self))]
    async fn inspect(&self, name: &str) -> Result<Option<RunningEnvironment>> {
        validate_environment_name(name)?;
        let output = self
            .runtime(&[
                "inspect",
                "--type",
                "container",
                "--format",
                "{{.Name}}\t{{.State.Status}}\t{{.Config.Image}}",
                name,
            ])
            .await?;

        if !output.success {
            if output.stderr.to_lowercase().contains("no such") {
                return Ok(None);
            }
            return Err(RuntimeError::Cli(format!("Inspect failed: {}", output.stderr)).into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut fields = stdout.trim().split('\t');
        let name = fields.next().unwrap_or(name).trim_start_matches('/').to_string();
        let status = EnvironmentStatus::from(fields.next().unwrap_or("unknown"));
        let image = fields.next().unwrap_or("unknown").to_string();
        Ok(Some(RunningEnvironment { name, status, image }))
    }

    #[instrument(skip(self))]
    async fn start(&self, name: &str) -> Result<()> {
        validate_environment_name(name)?;
        let output = self.runtime(&["start", name]).await?;
        if !output.success {
            return Err(RuntimeError::Cli(format!(
                "Failed to start environment '{}': {}",
                name, output.stderr
            ))
            .into());
        }
        debug!("Environment {} started", name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str) -> Result<()> {
        validate_environment_name(name)?;
        let output = self.runtime(&["stop", name]).await.map_err(|e| {
            TransitionError::EnvironmentStop {
                name: name.to_string(),
                message: e.to_string(),
            }
        })?;

        if !output.success {
            return Err(TransitionError::EnvironmentStop {
                name: name.to_string(),
                message: output.stderr,
            }
            .into());
        }
        debug!("Environment {} stopped", name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn attach_uri(&self, workspace_path: &Path) -> Result<AttachUri> {
        match &self.bridge {
            AttachBridge::Native => Ok(AttachUri {
                authority: None,
                path: workspace_path.to_path_buf(),
            }),
            AttachBridge::Wsl { default_distro } => {
                let current = std::env::var("WSL_DISTRO_NAME").ok();
                let listed = if current.is_some() {
                    Vec::new()
                } else {
                    self.listed_distros().await
                };
                let distro = resolve_distro(current, &listed, default_distro.as_deref())?;
                Ok(AttachUri {
                    authority: Some(format!("wsl+{}", distro)),
                    path: workspace_path.to_path_buf(),
                })
            }
        }
    }
}

pub mod mock {
    //! In-memory runtime for exercising the transition engine without a daemon

    use super::{AttachUri, EnvironmentStatus, RunningEnvironment, RuntimeClient};
    use crate::errors::{Result, RuntimeError, TransitionError};
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    /// A call made against the mock, in order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RuntimeCall {
        List(String),
        Inspect(String),
        Start(String),
        Stop(String),
        AttachUri(PathBuf),
    }

    #[derive(Debug, Default)]
    struct MockState {
        environments: Vec<RunningEnvironment>,
        failing_stops: HashSet<String>,
        bridge_authority: Option<String>,
        bridge_unresolvable: bool,
        calls: Vec<RuntimeCall>,
    }

    /// Mock runtime with shared state so clones observe the same calls
    #[derive(Debug, Clone, Default)]
    pub struct MockRuntime {
        state: Arc<Mutex<MockState>>,
    }

    impl MockRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add an environment in the given state
        pub fn add_environment(&self, name: &str, status: EnvironmentStatus) {
            self.state
                .lock()
                .unwrap()
                .environments
                .push(RunningEnvironment::new(name, status, "dockside/base:latest"));
        }

        /// Add a running environment
        pub fn add_running(&self, name: &str) {
            self.add_environment(name, EnvironmentStatus::Running);
        }

        /// Make `stop(name)` fail
        pub fn fail_stop(&self, name: &str) {
            self.state.lock().unwrap().failing_stops.insert(name.to_string());
        }

        /// Attach through a bridge authority such as `wsl+Ubuntu`
        pub fn with_bridge(self, authority: &str) -> Self {
            self.state.lock().unwrap().bridge_authority = Some(authority.to_string());
            self
        }

        /// Make attach URI resolution fail
        pub fn fail_bridge(&self) {
            self.state.lock().unwrap().bridge_unresolvable = true;
        }

        pub fn calls(&self) -> Vec<RuntimeCall> {
            self.state.lock().unwrap().calls.clone()
        }

        /// Names passed to `stop`, in order
        pub fn stop_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    RuntimeCall::Stop(name) => Some(name),
                    _ => None,
                })
                .collect()
        }

        pub fn status_of(&self, name: &str) -> Option<EnvironmentStatus> {
            self.state
                .lock()
                .unwrap()
                .environments
                .iter()
                .find(|e| e.name == name)
                .map(|e| e.status.clone())
        }

        fn record(&self, call: RuntimeCall) {
            self.state.lock().unwrap().calls.push(call);
        }
    }

    impl RuntimeClient for MockRuntime {
        async fn list_environments(&self, name_prefix: &str) -> Result<Vec<RunningEnvironment>> {
            self.record(RuntimeCall::List(name_prefix.to_string()));
            let state = self.state.lock().unwrap();
            Ok(state
                .environments
                .iter()
                .filter(|e| e.name.starts_with(name_prefix))
                .cloned()
                .collect())
        }

        async fn inspect(&self, name: &str) -> Result<Option<RunningEnvironment>> {
            self.record(RuntimeCall::Inspect(name.to_string()));
            let state = self.state.lock().unwrap();
            Ok(state.environments.iter().find(|e| e.name == name).cloned())
        }

        async fn start(&self, name: &str) -> Result<()> {
            self.record(RuntimeCall::Start(name.to_string()));
            let mut state = self.state.lock().unwrap();
            match state.environments.iter_mut().find(|e| e.name == name) {
                Some(env) => {
                    env.status = EnvironmentStatus::Running;
                    Ok(())
                }
                None => Err(RuntimeError::Cli(format!("No such container: {}", name)).into()),
            }
        }

        async fn stop(&self, name: &str) -> Result<()> {
            self.record(RuntimeCall::Stop(name.to_string()));
            let mut state = self.state.lock().unwrap();
            if state.failing_stops.contains(name) {
                return Err(TransitionError::EnvironmentStop {
                    name: name.to_string(),
                    message: "Error response from daemon: cannot stop container".to_string(),
                }
                .into());
            }
            if let Some(env) = state.environments.iter_mut().find(|e| e.name == name) {
                env.status = EnvironmentStatus::Exited;
            }
            Ok(())
        }

        async fn attach_uri(&self, workspace_path: &Path) -> Result<AttachUri> {
            self.record(RuntimeCall::AttachUri(workspace_path.to_path_buf()));
            let state = self.state.lock().unwrap();
            if state.bridge_unresolvable {
                return Err(TransitionError::BridgeResolution {
                    message: "no WSL distro found and no default distro configured".to_string(),
                }
                .into());
            }
            Ok(AttachUri {
                authority: state.bridge_authority.clone(),
                path: workspace_path.to_path_buf(),
            })
        }
    }
}
