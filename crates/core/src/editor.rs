//! Editor host interface
//!
//! The editor's window, dialog and notification primitives sit behind
//! [`EditorHost`]. The binary provides a terminal-backed implementation; tests
//! use [`mock::MockEditor`].

use crate::errors::Result;
use crate::runtime::AttachUri;
use std::path::{Path, PathBuf};

/// Severity of a message surfaced to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// What the editor opens once attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachTarget {
    /// Open the folder itself
    Folder,
    /// Open an owned workspace descriptor (workspace-namespace path)
    WorkspaceFile(PathBuf),
}

/// Arguments for the editor's "open in environment" primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub uri: AttachUri,
    pub environment: String,
    pub target: AttachTarget,
}

/// Editor primitives the transition engine depends on
#[allow(async_fn_in_trait)]
pub trait EditorHost {
    /// Whether the active session runs inside a containerized environment
    fn is_in_environment(&self) -> bool;

    /// Folder the session has open, as the session sees it
    fn current_folder(&self) -> Option<PathBuf>;

    /// Open a host folder outside any environment
    async fn open_folder(&self, host_path: &Path) -> Result<()>;

    /// Open a folder or workspace file inside an environment
    async fn open_in_environment(&self, request: &AttachRequest) -> Result<()>;

    /// Ask the operator to confirm; `false` means cancel
    async fn confirm(&self, message: &str, detail: &[String]) -> bool;

    /// Surface a message to the operator
    fn notify(&self, level: NoticeLevel, message: &str);
}

pub mod mock {
    //! Scriptable editor host recording every call

    use super::{AttachRequest, EditorHost, NoticeLevel};
    use crate::errors::{DocksideError, Result};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum EditorCall {
        OpenFolder(PathBuf),
        OpenInEnvironment(AttachRequest),
        Confirm { message: String, detail: Vec<String> },
        Notify(NoticeLevel, String),
    }

    #[derive(Debug)]
    struct MockEditorState {
        in_environment: bool,
        current_folder: Option<PathBuf>,
        confirm_answer: bool,
        attach_failure: Option<String>,
        calls: Vec<EditorCall>,
    }

    /// Mock editor; clones share state.
    ///
    /// Opening a host folder leaves the environment, a successful attach enters
    /// it, mirroring what a real editor window does.
    #[derive(Debug, Clone)]
    pub struct MockEditor {
        state: Arc<Mutex<MockEditorState>>,
    }

    impl MockEditor {
        /// Editor with a folder open on the host
        pub fn on_host(folder: Option<&Path>) -> Self {
            Self::build(false, folder)
        }

        /// Editor with a folder open inside an environment
        pub fn in_environment(folder: &Path) -> Self {
            Self::build(true, Some(folder))
        }

        fn build(in_environment: bool, folder: Option<&Path>) -> Self {
            Self {
                state: Arc::new(Mutex::new(MockEditorState {
                    in_environment,
                    current_folder: folder.map(Path::to_path_buf),
                    confirm_answer: false,
                    attach_failure: None,
                    calls: Vec::new(),
                })),
            }
        }

        /// Answer every confirmation with `answer`
        pub fn answer_confirm(&self, answer: bool) {
            self.state.lock().unwrap().confirm_answer = answer;
        }

        /// Forget the open folder, as when the window has none
        pub fn clear_current_folder(&self) {
            self.state.lock().unwrap().current_folder = None;
        }

        pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    EditorCall::Notify(level, message) => Some((level, message)),
                    _ => None,
                })
                .collect()
        }

        /// Make the attach primitive fail with `message`
        pub fn fail_attach(&self, message: &str) {
            self.state.lock().unwrap().attach_failure = Some(message.to_string());
        }

        pub fn calls(&self) -> Vec<EditorCall> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn confirmations(&self) -> Vec<Vec<String>> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    EditorCall::Confirm { detail, .. } => Some(detail),
                    _ => None,
                })
                .collect()
        }

        pub fn attaches(&self) -> Vec<AttachRequest> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    EditorCall::OpenInEnvironment(request) => Some(request),
                    _ => None,
                })
                .collect()
        }

        pub fn opened_folders(&self) -> Vec<PathBuf> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    EditorCall::OpenFolder(path) => Some(path),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: EditorCall) {
            self.state.lock().unwrap().calls.push(call);
        }
    }

    impl EditorHost for MockEditor {
        fn is_in_environment(&self) -> bool {
            self.state.lock().unwrap().in_environment
        }

        fn current_folder(&self) -> Option<PathBuf> {
            self.state.lock().unwrap().current_folder.clone()
        }

        async fn open_folder(&self, host_path: &Path) -> Result<()> {
            self.record(EditorCall::OpenFolder(host_path.to_path_buf()));
            let mut state = self.state.lock().unwrap();
            state.in_environment = false;
            state.current_folder = Some(host_path.to_path_buf());
            Ok(())
        }

        async fn open_in_environment(&self, request: &AttachRequest) -> Result<()> {
            self.record(EditorCall::OpenInEnvironment(request.clone()));
            let mut state = self.state.lock().unwrap();
            if let Some(message) = &state.attach_failure {
                return Err(DocksideError::Editor(message.clone()));
            }
            state.in_environment = true;
            state.current_folder = Some(request.uri.path.clone());
            Ok(())
        }

        async fn confirm(&self, message: &str, detail: &[String]) -> bool {
            self.record(EditorCall::Confirm {
                message: message.to_string(),
                detail: detail.to_vec(),
            });
            self.state.lock().unwrap().confirm_answer
        }

        fn notify(&self, level: NoticeLevel, message: &str) {
            self.record(EditorCall::Notify(level, message.to_string()));
        }
    }
}
