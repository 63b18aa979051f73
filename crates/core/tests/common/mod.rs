//! Shared test helpers for core integration tests.

#![allow(dead_code)]

use dockside_core::descriptor::{ConfigStore, DescriptorDefaults};
use dockside_core::editor::mock::MockEditor;
use dockside_core::paths::NativePaths;
use dockside_core::runtime::mock::MockRuntime;
use dockside_core::session::{KeyValueStore, MemoryStore, SessionState};
use dockside_core::transition::{EngineOptions, TransitionEngine};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const SYSTEM_ID: &str = "dockside";
pub const PREFIX: &str = "dockside-";

/// Mocks plus a scratch directory holding project folders
pub struct Harness {
    pub temp: TempDir,
    pub editor: MockEditor,
    pub runtime: MockRuntime,
    pub store: MemoryStore,
}

impl Harness {
    /// Editor attached to an environment with `current` open
    pub fn in_environment(current: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let folder = make_folder(temp.path(), current);
        Self {
            editor: MockEditor::in_environment(&folder),
            temp,
            runtime: MockRuntime::new(),
            store: MemoryStore::new(),
        }
    }

    /// Editor on the host, optionally with `current` open
    pub fn on_host(current: Option<&str>) -> Self {
        let temp = TempDir::new().unwrap();
        let folder = current.map(|name| make_folder(temp.path(), name));
        Self {
            editor: MockEditor::on_host(folder.as_deref()),
            temp,
            runtime: MockRuntime::new(),
            store: MemoryStore::new(),
        }
    }

    pub fn folder(&self, name: &str) -> PathBuf {
        make_folder(self.temp.path(), name)
    }

    /// Project folder bound to `environment` by a hand-written descriptor
    pub fn bound_folder(&self, name: &str, environment: &str) -> PathBuf {
        let folder = self.folder(name);
        fs::write(
            folder.join(".devcontainer.json"),
            format!(r#"{{ "name": "{}", "service": "dev" }}"#, environment),
        )
        .unwrap();
        folder
    }

    pub fn attach_config_dir(&self) -> PathBuf {
        self.temp.path().join("attach-configs")
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::new(
            SYSTEM_ID,
            self.attach_config_dir(),
            DescriptorDefaults::default(),
        )
    }

    pub fn options() -> EngineOptions {
        EngineOptions {
            name_prefix: PREFIX.to_string(),
            settle: Duration::from_secs(3),
            cleanup_margin: Duration::from_secs(2),
            suppress_attach_prompt: true,
        }
    }

    pub fn engine(&self) -> TransitionEngine<MockEditor, MockRuntime> {
        self.engine_with_session(SessionState::load(self.store.clone()))
    }

    pub fn engine_with_session(
        &self,
        session: SessionState,
    ) -> TransitionEngine<MockEditor, MockRuntime> {
        TransitionEngine::new(
            self.editor.clone(),
            self.runtime.clone(),
            Box::new(NativePaths),
            self.config_store(),
            session,
            Self::options(),
        )
    }

    pub fn pending(&self) -> Option<String> {
        self.store
            .get(dockside_core::session::PENDING_WORKSPACE_CHANGE_KEY)
    }

    pub fn last_folder(&self) -> Option<String> {
        self.store
            .get(dockside_core::session::LAST_WORKSPACE_FOLDER_KEY)
    }
}

pub fn make_folder(root: &Path, name: &str) -> PathBuf {
    let folder = root.join(name);
    fs::create_dir_all(&folder).unwrap();
    folder
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
