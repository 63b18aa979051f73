//! Command surface
//!
//! Entry points invoked by the CLI. Each maps an engine outcome onto
//! [`CommandResult`]; error kinds are not interpreted here, only their message
//! is carried through.

use crate::editor::EditorHost;
use crate::errors::Result;
use crate::runtime::{RunningEnvironment, RuntimeClient};
use crate::transition::{SessionSnapshot, TransitionEngine, TransitionResult, WorkspaceTarget};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Outcome of a user-issued command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Completed; carries a one-line summary
    Ok(String),
    /// Declined at the confirmation prompt
    Cancelled,
    /// Failed; carries the error message
    Failed(String),
}

impl CommandResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Process exit code for this result
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ok(_) | Self::Cancelled => 0,
            Self::Failed(_) => 1,
        }
    }
}

impl From<Result<TransitionResult>> for CommandResult {
    fn from(result: Result<TransitionResult>) -> Self {
        match result {
            Ok(outcome) => describe(outcome),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

fn describe(outcome: TransitionResult) -> CommandResult {
    let message = match outcome {
        TransitionResult::Cancelled { .. } => return CommandResult::Cancelled,
        TransitionResult::FolderOpened { folder } => format!("Opened {}", folder.display()),
        TransitionResult::Attached {
            folder,
            environment,
        } => format!("Attached {} to {}", folder.display(), environment),
        TransitionResult::PendingSwitchStored { target, stopped } => format!(
            "Stopped {}; run switch again to attach to {}",
            stopped.join(", "),
            target.display()
        ),
        TransitionResult::Detached { folder: Some(folder) } => {
            format!("Detached to {}", folder.display())
        }
        TransitionResult::Detached { folder: None } => {
            "Not attached to an environment".to_string()
        }
        TransitionResult::Stopped { stopped, skipped } => {
            let mut message = if stopped.is_empty() {
                "No environment needed stopping".to_string()
            } else {
                format!("Stopped {}", stopped.join(", "))
            };
            if !skipped.is_empty() {
                message.push_str(&format!(" (already stopped: {})", skipped.join(", ")));
            }
            message
        }
    };
    CommandResult::Ok(message)
}

/// Snapshot reported by the `status` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub in_environment: bool,
    pub current_folder: Option<PathBuf>,
    pub session: SessionSnapshot,
    pub environments: Vec<RunningEnvironment>,
}

/// Thin entry points over [`TransitionEngine`]
pub struct CommandSurface<E, R> {
    engine: TransitionEngine<E, R>,
}

impl<E: EditorHost, R: RuntimeClient> CommandSurface<E, R> {
    pub fn new(engine: TransitionEngine<E, R>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TransitionEngine<E, R> {
        &self.engine
    }

    #[instrument(skip_all)]
    pub async fn request_attach(&self, folder: Option<PathBuf>) -> CommandResult {
        self.engine
            .request_attach(folder.map(WorkspaceTarget::new))
            .await
            .into()
    }

    #[instrument(skip_all)]
    pub async fn request_detach(&self) -> CommandResult {
        self.engine.request_detach().await.into()
    }

    #[instrument(skip_all)]
    pub async fn request_switch(&self, folder: Option<PathBuf>) -> CommandResult {
        self.engine
            .request_switch(folder.map(WorkspaceTarget::new))
            .await
            .into()
    }

    /// Stop the named environments, or every running prefixed environment when
    /// `names` is empty
    #[instrument(skip_all)]
    pub async fn request_stop_conflicting(&self, names: Vec<String>) -> CommandResult {
        let names = if names.is_empty() {
            match self.engine.list_environments().await {
                Ok(environments) => environments
                    .into_iter()
                    .filter(RunningEnvironment::is_running)
                    .map(|env| env.name)
                    .collect(),
                Err(e) => return CommandResult::Failed(e.to_string()),
            }
        } else {
            names
        };
        debug!(?names, "Stop requested");
        self.engine.request_stop(&names).await.into()
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let editor = self.engine.editor();
        Ok(StatusReport {
            in_environment: editor.is_in_environment(),
            current_folder: editor.current_folder(),
            session: self.engine.session().await,
            environments: self.engine.list_environments().await?,
        })
    }

    /// Generate descriptors for `folder` if it has none
    #[instrument(skip_all, fields(folder = %folder.display()))]
    pub fn init(&self, folder: &Path) -> CommandResult {
        match self.engine.prepare(folder) {
            Ok(resolved) if resolved.synthesized => CommandResult::Ok(format!(
                "Generated descriptors for {} ({})",
                folder.display(),
                resolved.environment.name
            )),
            Ok(resolved) => CommandResult::Ok(format!(
                "{} already bound to {}",
                folder.display(),
                resolved.environment.name
            )),
            Err(e) => CommandResult::Failed(e.to_string()),
        }
    }
}
