//! Settings
//!
//! Resolution order: CLI flag (applied by the binary) > environment variable >
//! settings file > built-in default. The settings file is TOML and optional.

use crate::descriptor::DescriptorDefaults;
use crate::errors::{Result, SettingsError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Attached-container configs below the editor's user config directory
const EDITOR_NAME_CONFIGS: &str =
    "Code/User/globalStorage/ms-vscode-remote.remote-containers/nameConfigs";

/// Upper bound for the settle period
pub const MAX_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Container runtime binary (`docker`, `podman`, or a path)
    pub runtime_path: String,
    /// Name prefix shared by every environment this system manages
    pub name_prefix: String,
    /// Environment used when a folder has no descriptor
    pub default_environment: String,
    /// Compose file name for synthesized descriptors; `{arch}` is substituted
    pub compose_file: String,
    pub service: String,
    pub remote_user: String,
    pub workspace_folder: String,
    /// Ownership marker written into generated descriptors
    pub system_id: String,
    /// Wait after the attach call before the transition counts as complete
    pub settle_ms: u64,
    /// Extra delay before transient descriptors are removed
    pub cleanup_margin_ms: u64,
    /// Write a transient attach descriptor so the editor does not prompt
    pub suppress_attach_prompt: bool,
    /// Editor command line, split with shell rules
    pub editor_command: String,
    /// WSL distro used when none can be discovered
    pub wsl_default_distro: Option<String>,
    /// Where the editor looks up attached-container configs by container name
    pub attach_config_dir: Option<PathBuf>,
    /// Session state file
    pub session_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = DescriptorDefaults::default();
        Self {
            runtime_path: "docker".to_string(),
            name_prefix: "dockside-".to_string(),
            default_environment: defaults.environment_name,
            compose_file: defaults.compose_file,
            service: defaults.service,
            remote_user: defaults.remote_user,
            workspace_folder: defaults.workspace_folder,
            system_id: "dockside".to_string(),
            settle_ms: 3000,
            cleanup_margin_ms: 2000,
            suppress_attach_prompt: true,
            editor_command: "code".to_string(),
            wsl_default_distro: None,
            attach_config_dir: None,
            session_file: None,
        }
    }
}

impl Settings {
    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        directories_next::ProjectDirs::from("", "", "dockside")
            .map(|dirs| dirs.config_dir().join("settings.toml"))
    }

    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut settings = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings = toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    /// Apply `DOCKSIDE_*` overrides using `lookup` for variable access
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DOCKSIDE_RUNTIME") {
            self.runtime_path = v;
        }
        if let Some(v) = lookup("DOCKSIDE_PREFIX") {
            self.name_prefix = v;
        }
        if let Some(v) = lookup("DOCKSIDE_DEFAULT_ENVIRONMENT") {
            self.default_environment = v;
        }
        if let Some(v) = lookup("DOCKSIDE_EDITOR") {
            self.editor_command = v;
        }
        if let Some(v) = lookup("DOCKSIDE_SETTLE_MS") {
            match v.parse() {
                Ok(ms) => self.settle_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid DOCKSIDE_SETTLE_MS '{}'", v),
            }
        }
    }

    /// Settle period, bounded by [`MAX_SETTLE`]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms).min(MAX_SETTLE)
    }

    pub fn cleanup_margin(&self) -> Duration {
        Duration::from_millis(self.cleanup_margin_ms)
    }

    pub fn descriptor_defaults(&self) -> DescriptorDefaults {
        DescriptorDefaults {
            environment_name: self.default_environment.clone(),
            compose_file: self.compose_file.clone(),
            service: self.service.clone(),
            remote_user: self.remote_user.clone(),
            workspace_folder: self.workspace_folder.clone(),
        }
    }

    /// The editor's `nameConfigs` storage unless overridden. A config found
    /// there when attaching answers the editor's folder prompt.
    pub fn attach_config_dir(&self) -> PathBuf {
        self.attach_config_dir.clone().unwrap_or_else(|| {
            directories_next::BaseDirs::new()
                .map(|dirs| dirs.config_dir().to_path_buf())
                .unwrap_or_else(std::env::temp_dir)
                .join(EDITOR_NAME_CONFIGS)
        })
    }
}
