//! Environment and workspace descriptors
//!
//! Two JSON files bind a project folder to an environment:
//!
//! - the environment descriptor (`.devcontainer/devcontainer.json`, or
//!   `.devcontainer.json` in the folder root), naming the environment and the
//!   compose files that materialize it;
//! - the workspace descriptor (`<project>.code-workspace`), grouping the folder
//!   with editor settings and creation metadata.
//!
//! Reads fail soft: a missing or malformed file reads as absent. Files this crate
//! writes carry the configured system id as an ownership marker, and only marked
//! files are ever reused or overwritten.

use crate::errors::{DescriptorError, Result};
use crate::paths::PathAdapter;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Root-level environment descriptor file name
pub const ENVIRONMENT_DESCRIPTOR_FILE: &str = ".devcontainer.json";
/// Extension of workspace descriptor files
pub const WORKSPACE_DESCRIPTOR_EXTENSION: &str = "code-workspace";

/// Which containerized environment a folder is bound to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDescriptor {
    /// Environment (container) name, e.g. `dockside-v2`
    pub name: String,
    /// Compose files used to materialize the environment
    #[serde(default)]
    pub compose_files: Vec<String>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub workspace_folder: String,
    #[serde(default)]
    pub remote_user: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub customizations: Map<String, Value>,
    /// Ownership marker, present only on descriptors this crate generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMetadata {
    pub created_by: String,
    pub created_at: String,
    pub environment_version: String,
}

/// Editor workspace file grouping folder, settings and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDescriptor {
    #[serde(default)]
    pub folders: Vec<WorkspaceFolder>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WorkspaceMetadata>,
}

/// Anything that can carry the ownership marker
pub trait Owned {
    fn created_by(&self) -> Option<&str>;
}

impl Owned for EnvironmentDescriptor {
    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

impl Owned for WorkspaceDescriptor {
    fn created_by(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.created_by.as_str())
    }
}

/// Values used when synthesizing a default environment descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorDefaults {
    pub environment_name: String,
    /// Compose file name; `{arch}` is replaced with the container architecture
    pub compose_file: String,
    pub service: String,
    pub remote_user: String,
    pub workspace_folder: String,
}

impl Default for DescriptorDefaults {
    fn default() -> Self {
        Self {
            environment_name: "dockside-latest".to_string(),
            compose_file: "compose.{arch}.yml".to_string(),
            service: "dev".to_string(),
            remote_user: "vscode".to_string(),
            workspace_folder: "/workspace".to_string(),
        }
    }
}

/// Container architecture name for the host CPU
pub fn container_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Handle to a transient attach descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientDescriptor {
    pub path: PathBuf,
    /// Someone else's file was already there; removal leaves it alone
    pub preexisting: bool,
}

/// Reads, writes and cleans up descriptor files
#[derive(Debug, Clone)]
pub struct ConfigStore {
    system_id: String,
    transient_dir: PathBuf,
    defaults: DescriptorDefaults,
}

impl ConfigStore {
    pub fn new(
        system_id: impl Into<String>,
        transient_dir: impl Into<PathBuf>,
        defaults: DescriptorDefaults,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            transient_dir: transient_dir.into(),
            defaults,
        }
    }

    /// Environment descriptor locations in lookup order
    pub fn environment_descriptor_candidates(folder: &Path) -> [PathBuf; 2] {
        [
            folder.join(".devcontainer").join("devcontainer.json"),
            folder.join(ENVIRONMENT_DESCRIPTOR_FILE),
        ]
    }

    /// Workspace descriptor path, named after the folder's final segment
    pub fn workspace_descriptor_path(folder: &Path) -> PathBuf {
        let project = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        folder.join(format!("{}.{}", project, WORKSPACE_DESCRIPTOR_EXTENSION))
    }

    /// Read the environment descriptor; absent on missing file or parse error
    #[instrument(skip_all, fields(folder = %folder.display()))]
    pub fn read_environment_descriptor(&self, folder: &Path) -> Option<EnvironmentDescriptor> {
        Self::environment_descriptor_candidates(folder)
            .iter()
            .find_map(|path| soft_read(path))
    }

    /// Read the workspace descriptor; absent on missing file or parse error
    #[instrument(skip_all, fields(folder = %folder.display()))]
    pub fn read_workspace_descriptor(&self, folder: &Path) -> Option<WorkspaceDescriptor> {
        soft_read(&Self::workspace_descriptor_path(folder))
    }

    /// Exact ownership check against this system's id
    pub fn is_owned_by_this_system(&self, descriptor: &impl Owned) -> bool {
        descriptor.created_by() == Some(self.system_id.as_str())
    }

    /// Build the default descriptors for `folder`.
    ///
    /// Deterministic for the same folder and defaults, apart from
    /// `metadata.createdAt` on the workspace descriptor.
    pub fn synthesize(
        &self,
        folder: &Path,
        paths: &dyn PathAdapter,
    ) -> (EnvironmentDescriptor, WorkspaceDescriptor) {
        let compose_file = self.defaults.compose_file.replace("{arch}", container_arch());
        let compose_path = folder.join(".devcontainer").join(compose_file);

        let environment = EnvironmentDescriptor {
            name: self.defaults.environment_name.clone(),
            compose_files: vec![paths.to_mount_namespace(&compose_path)],
            service: self.defaults.service.clone(),
            workspace_folder: self.defaults.workspace_folder.clone(),
            remote_user: self.defaults.remote_user.clone(),
            customizations: Map::new(),
            created_by: Some(self.system_id.clone()),
        };

        let workspace = self.workspace_for(&environment);
        (environment, workspace)
    }

    /// Owned workspace descriptor for a folder bound to `environment`
    pub fn workspace_for(&self, environment: &EnvironmentDescriptor) -> WorkspaceDescriptor {
        WorkspaceDescriptor {
            folders: vec![WorkspaceFolder {
                path: ".".to_string(),
            }],
            settings: Map::new(),
            metadata: Some(WorkspaceMetadata {
                created_by: self.system_id.clone(),
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                environment_version: environment.name.clone(),
            }),
        }
    }

    /// Write the environment descriptor, then the workspace descriptor.
    ///
    /// A failure on the second write does not roll back the first; the returned
    /// error lists what was written. Re-running synthesis repairs the pair.
    #[instrument(skip_all, fields(folder = %folder.display()))]
    pub fn write_descriptors(
        &self,
        folder: &Path,
        environment: &EnvironmentDescriptor,
        workspace: Option<&WorkspaceDescriptor>,
    ) -> Result<()> {
        let env_path = folder.join(ENVIRONMENT_DESCRIPTOR_FILE);
        write_json_atomic(&env_path, environment).map_err(|e| DescriptorError::Write {
            path: env_path.display().to_string(),
            message: e.to_string(),
            written: Vec::new(),
        })?;
        info!(path = %env_path.display(), "Wrote environment descriptor");

        if let Some(workspace) = workspace {
            let ws_path = Self::workspace_descriptor_path(folder);
            write_json_atomic(&ws_path, workspace).map_err(|e| DescriptorError::Write {
                path: ws_path.display().to_string(),
                message: e.to_string(),
                written: vec![env_path.display().to_string()],
            })?;
            info!(path = %ws_path.display(), "Wrote workspace descriptor");
        }

        Ok(())
    }

    /// Write only the workspace descriptor, used to repair a partial write
    pub fn write_workspace_descriptor(
        &self,
        folder: &Path,
        workspace: &WorkspaceDescriptor,
    ) -> Result<PathBuf> {
        let path = Self::workspace_descriptor_path(folder);
        write_json_atomic(&path, workspace).map_err(|e| DescriptorError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
            written: Vec::new(),
        })?;
        info!(path = %path.display(), "Wrote workspace descriptor");
        Ok(path)
    }

    /// Write the editor's attached-container config for `environment`, so the
    /// attach does not prompt for a folder.
    ///
    /// A file someone else wrote is left untouched. One carrying this system's
    /// marker is a leftover from an earlier run and is replaced.
    #[instrument(skip_all, fields(environment = %environment.name))]
    pub fn create_transient(
        &self,
        environment: &EnvironmentDescriptor,
    ) -> Result<TransientDescriptor> {
        let path = self.transient_dir.join(format!("{}.json", environment.name));
        match read_json::<Value>(&path) {
            Ok(None) => {}
            Ok(Some(existing))
                if existing.get("createdBy").and_then(Value::as_str)
                    == Some(self.system_id.as_str()) =>
            {
                debug!(path = %path.display(), "Replacing leftover attach descriptor");
            }
            _ => {
                debug!(path = %path.display(), "Attach descriptor already present, reusing");
                return Ok(TransientDescriptor {
                    path,
                    preexisting: true,
                });
            }
        }

        let mut content = Map::new();
        if !environment.workspace_folder.is_empty() {
            content.insert(
                "workspaceFolder".into(),
                environment.workspace_folder.clone().into(),
            );
        }
        if !environment.remote_user.is_empty() {
            content.insert("remoteUser".into(), environment.remote_user.clone().into());
        }
        content.insert("createdBy".into(), self.system_id.clone().into());
        write_json_atomic(&path, &content)?;
        debug!(path = %path.display(), "Created transient attach descriptor");

        Ok(TransientDescriptor {
            path,
            preexisting: false,
        })
    }

    /// Remove a transient descriptor created by [`Self::create_transient`]
    pub fn remove_transient(handle: &TransientDescriptor) -> Result<()> {
        if handle.preexisting {
            return Ok(());
        }
        match fs::remove_file(&handle.path) {
            Ok(()) => {
                debug!(path = %handle.path.display(), "Removed transient attach descriptor");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DescriptorError::Io(e).into()),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> std::result::Result<Option<T>, DescriptorError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DescriptorError::Io(e)),
    };

    // json5 accepts comments and trailing commas, as editors write them
    json5::from_str(&content)
        .map(Some)
        .map_err(|e| DescriptorError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

fn soft_read<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match read_json(path) {
        Ok(value) => value,
        Err(e) => {
            warn!("{}; treating as absent", e);
            None
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::result::Result<(), DescriptorError> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write via temp file + rename so readers never see a partial file
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{NativePaths, WslPaths};
    use tempfile::TempDir;

    fn store(dir: &Path) -> ConfigStore {
        ConfigStore::new("dockside", dir.join("attach"), DescriptorDefaults::default())
    }

    #[test]
    fn test_read_missing_descriptors_is_absent() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        assert!(store.read_environment_descriptor(temp.path()).is_none());
        assert!(store.read_workspace_descriptor(temp.path()).is_none());
    }

    #[test]
    fn test_malformed_descriptor_is_absent() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".devcontainer.json"), "{ name: ").unwrap();
        assert!(store(temp.path())
            .read_environment_descriptor(temp.path())
            .is_none());
    }

    #[test]
    fn test_read_jsonc_descriptor() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".devcontainer")).unwrap();
        fs::write(
            temp.path().join(".devcontainer/devcontainer.json"),
            r#"{
    // hand written
    "name": "dockside-v2",
    "composeFiles": ["compose.yml"],
}"#,
        )
        .unwrap();

        let env = store(temp.path())
            .read_environment_descriptor(temp.path())
            .unwrap();
        assert_eq!(env.name, "dockside-v2");
        assert_eq!(env.compose_files, vec!["compose.yml".to_string()]);
        assert_eq!(env.created_by, None);
    }

    #[test]
    fn test_nested_descriptor_wins_over_root() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".devcontainer")).unwrap();
        fs::write(
            temp.path().join(".devcontainer/devcontainer.json"),
            r#"{"name": "nested"}"#,
        )
        .unwrap();
        fs::write(temp.path().join(".devcontainer.json"), r#"{"name": "root"}"#).unwrap();

        let env = store(temp.path())
            .read_environment_descriptor(temp.path())
            .unwrap();
        assert_eq!(env.name, "nested");
    }

    #[test]
    fn test_ownership_requires_exact_marker() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());

        let mut workspace = WorkspaceDescriptor {
            folders: vec![],
            settings: Map::new(),
            metadata: None,
        };
        assert!(!store.is_owned_by_this_system(&workspace));

        workspace.metadata = Some(WorkspaceMetadata {
            created_by: "dockside-fork".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            environment_version: "dockside-v1".to_string(),
        });
        assert!(!store.is_owned_by_this_system(&workspace));

        workspace.metadata.as_mut().unwrap().created_by = "dockside".to_string();
        assert!(store.is_owned_by_this_system(&workspace));
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        let folder = temp.path().join("app");
        fs::create_dir(&folder).unwrap();

        let (first, _) = store.synthesize(&folder, &NativePaths);
        store.write_descriptors(&folder, &first, None).unwrap();
        let first_bytes = fs::read(folder.join(ENVIRONMENT_DESCRIPTOR_FILE)).unwrap();

        let (second, _) = store.synthesize(&folder, &NativePaths);
        store.write_descriptors(&folder, &second, None).unwrap();
        let second_bytes = fs::read(folder.join(ENVIRONMENT_DESCRIPTOR_FILE)).unwrap();

        assert_eq!(first_bytes, second_bytes);
        assert_eq!(first.created_by.as_deref(), Some("dockside"));
    }

    #[test]
    fn test_synthesis_uses_mount_namespace() {
        let store = ConfigStore::new("dockside", "attach", DescriptorDefaults::default());
        let (env, workspace) = store.synthesize(Path::new(r"C:\src\app"), &WslPaths::new(None));
        let expected = format!("/c/src/app/.devcontainer/compose.{}.yml", container_arch());
        assert_eq!(env.compose_files, vec![expected]);
        assert_eq!(
            workspace.metadata.unwrap().environment_version,
            "dockside-latest"
        );
    }

    #[test]
    fn test_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        let folder = temp.path().join("project");
        fs::create_dir(&folder).unwrap();

        let (env, workspace) = store.synthesize(&folder, &NativePaths);
        store
            .write_descriptors(&folder, &env, Some(&workspace))
            .unwrap();
        assert!(folder.join("project.code-workspace").is_file());

        assert_eq!(store.read_environment_descriptor(&folder), Some(env));
        let read = store.read_workspace_descriptor(&folder).unwrap();
        assert!(store.is_owned_by_this_system(&read));
        assert_eq!(read.folders[0].path, ".");
    }

    #[test]
    fn test_partial_write_reports_written_files() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        let folder = temp.path().join("project");
        fs::create_dir(&folder).unwrap();
        // A directory where the workspace file should go makes the rename fail
        fs::create_dir(folder.join("project.code-workspace")).unwrap();

        let (env, workspace) = store.synthesize(&folder, &NativePaths);
        let err = store
            .write_descriptors(&folder, &env, Some(&workspace))
            .unwrap_err();
        match err {
            crate::errors::DocksideError::Descriptor(DescriptorError::Write { written, .. }) => {
                assert_eq!(written.len(), 1);
                assert!(written[0].ends_with(ENVIRONMENT_DESCRIPTOR_FILE));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.read_environment_descriptor(&folder).is_some());
    }

    #[test]
    fn test_transient_lifecycle() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        let (env, _) = store.synthesize(temp.path(), &NativePaths);

        let handle = store.create_transient(&env).unwrap();
        assert!(!handle.preexisting);
        assert!(handle.path.exists());

        ConfigStore::remove_transient(&handle).unwrap();
        assert!(!handle.path.exists());
        // Removing twice is fine
        ConfigStore::remove_transient(&handle).unwrap();
    }

    #[test]
    fn test_preexisting_transient_is_kept() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        let (env, _) = store.synthesize(temp.path(), &NativePaths);
        let attach_dir = temp.path().join("attach");
        fs::create_dir_all(&attach_dir).unwrap();
        fs::write(attach_dir.join("dockside-latest.json"), "{}").unwrap();

        let handle = store.create_transient(&env).unwrap();
        assert!(handle.preexisting);
        ConfigStore::remove_transient(&handle).unwrap();
        assert!(handle.path.exists());
    }

    #[test]
    fn test_owned_leftover_transient_is_replaced() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        let (env, _) = store.synthesize(temp.path(), &NativePaths);
        let attach_dir = temp.path().join("attach");
        fs::create_dir_all(&attach_dir).unwrap();
        fs::write(
            attach_dir.join("dockside-latest.json"),
            r#"{"createdBy":"dockside"}"#,
        )
        .unwrap();

        let handle = store.create_transient(&env).unwrap();
        assert!(!handle.preexisting);

        let content: Value =
            serde_json::from_str(&fs::read_to_string(&handle.path).unwrap()).unwrap();
        assert_eq!(content["workspaceFolder"], "/workspace");
        assert_eq!(content["remoteUser"], "vscode");

        ConfigStore::remove_transient(&handle).unwrap();
        assert!(!handle.path.exists());
    }
}
