//! Workspace transition engine
//!
//! Decides, for a requested folder, whether the editor can attach straight away
//! or whether a running environment of another version stands in the way. A
//! conflict is only ever resolved after the operator confirms it, and always in
//! the same order: record the current folder, detach the editor, stop the
//! conflicting environments one by one, queue the target as the pending switch.
//! The next request made from outside an environment consumes the pending switch
//! and attaches.
//!
//! Per request the engine moves through:
//!
//! ```text
//! Idle -> ResolvingTarget -> {DirectAttach | ConflictCheck}
//! ConflictCheck -> {Attaching | AwaitingConfirmation}
//! AwaitingConfirmation -> {Cancelled | Detaching}
//! Detaching -> StoppingConflicts -> PendingSwitchStored
//! Attaching -> Settling -> Attached
//! any -> Failed
//! ```
//!
//! At most one request runs at a time; a concurrent request is rejected with
//! `TransitionError::SwitchInProgress`.

use crate::descriptor::{ConfigStore, EnvironmentDescriptor, WorkspaceDescriptor};
use crate::editor::{AttachRequest, AttachTarget, EditorHost, NoticeLevel};
use crate::errors::{DocksideError, Result, TransitionError};
use crate::paths::PathAdapter;
use crate::runtime::{version_tag, RunningEnvironment, RuntimeClient};
use crate::schedule::ScheduledTask;
use crate::session::SessionState;
use crate::settings::Settings;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// A request to switch to a host folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceTarget {
    host_path: PathBuf,
}

impl WorkspaceTarget {
    pub fn new(host_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
        }
    }

    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// The host path as the editor session sees it
    pub fn workspace_path(&self, paths: &dyn PathAdapter) -> PathBuf {
        paths.to_workspace_namespace(&self.host_path)
    }

    /// Final path segment
    pub fn project_name(&self) -> String {
        self.host_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// States a single request moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    ResolvingTarget,
    DirectAttach,
    ConflictCheck,
    AwaitingConfirmation,
    Cancelled,
    Detaching,
    StoppingConflicts,
    PendingSwitchStored,
    Attaching,
    Settling,
    Attached,
    FolderOpened,
    Failed,
}

/// Outcome of an engine operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Bare folder open outside any environment
    FolderOpened { folder: PathBuf },
    /// The editor attached to `environment`
    Attached { folder: PathBuf, environment: String },
    /// The operator declined; nothing was stopped
    Cancelled { conflicting: Vec<String> },
    /// Conflicts were stopped and the target queued for the next request
    PendingSwitchStored { target: PathBuf, stopped: Vec<String> },
    /// The editor left its environment (`None` when it was not in one)
    Detached { folder: Option<PathBuf> },
    /// Explicit stop request finished
    Stopped { stopped: Vec<String>, skipped: Vec<String> },
}

impl TransitionResult {
    pub fn terminal_state(&self) -> TransitionState {
        match self {
            Self::FolderOpened { .. } | Self::Detached { .. } => TransitionState::FolderOpened,
            Self::Attached { .. } => TransitionState::Attached,
            Self::Cancelled { .. } => TransitionState::Cancelled,
            Self::PendingSwitchStored { .. } => TransitionState::PendingSwitchStored,
            Self::Stopped { .. } => TransitionState::Idle,
        }
    }
}

/// Result of comparing the target environment with what is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictVerdict {
    /// No running environment carries the prefix
    NothingRunning,
    /// The target environment itself is running
    AlreadyRunning,
    /// Running environments of other versions
    Conflict(Vec<String>),
}

/// Classify running environments against the target environment name.
///
/// Only running environments carrying `prefix` take part; an exact name match
/// wins over any other running version.
pub fn classify(target: &str, running: &[RunningEnvironment], prefix: &str) -> ConflictVerdict {
    let candidates: Vec<&RunningEnvironment> = running
        .iter()
        .filter(|env| env.is_running() && env.version_tag(prefix).is_some())
        .collect();

    if candidates.iter().any(|env| env.name == target) {
        return ConflictVerdict::AlreadyRunning;
    }

    let target_tag = version_tag(target, prefix);
    let conflicting: Vec<String> = candidates
        .into_iter()
        .filter(|env| env.version_tag(prefix) != target_tag)
        .map(|env| env.name.clone())
        .collect();

    if conflicting.is_empty() {
        ConflictVerdict::NothingRunning
    } else {
        ConflictVerdict::Conflict(conflicting)
    }
}

/// Descriptors resolved for a target folder
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub environment: EnvironmentDescriptor,
    pub workspace: Option<WorkspaceDescriptor>,
    /// The environment descriptor was generated during this request
    pub synthesized: bool,
    // Generated in memory, not on disk yet
    unwritten_environment: bool,
    unwritten_workspace: bool,
}

impl ResolvedTarget {
    fn on_disk(environment: EnvironmentDescriptor, workspace: Option<WorkspaceDescriptor>) -> Self {
        Self {
            environment,
            workspace,
            synthesized: false,
            unwritten_environment: false,
            unwritten_workspace: false,
        }
    }
}

/// Tunables taken from [`Settings`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub name_prefix: String,
    pub settle: Duration,
    pub cleanup_margin: Duration,
    pub suppress_attach_prompt: bool,
}

impl From<&Settings> for EngineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            name_prefix: settings.name_prefix.clone(),
            settle: settings.settle(),
            cleanup_margin: settings.cleanup_margin(),
            suppress_attach_prompt: settings.suppress_attach_prompt,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Read-only view of the session fields for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub last_workspace_folder: Option<PathBuf>,
    pub pending_workspace_change: Option<PathBuf>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Logs every state change of one request
struct Tracker {
    operation: &'static str,
    state: TransitionState,
}

impl Tracker {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            state: TransitionState::Idle,
        }
    }

    fn enter(&mut self, next: TransitionState) {
        debug!(
            operation = self.operation,
            from = ?self.state,
            to = ?next,
            "Transition"
        );
        self.state = next;
    }

    fn finish(mut self, result: &Result<TransitionResult>) {
        match result {
            Ok(outcome) => {
                let terminal = outcome.terminal_state();
                if self.state != terminal {
                    self.enter(terminal);
                }
            }
            Err(e) => {
                warn!(operation = self.operation, state = ?self.state, "Transition failed: {}", e);
                self.enter(TransitionState::Failed);
            }
        }
    }
}

/// Orchestrates attach, detach and conflict resolution
pub struct TransitionEngine<E, R> {
    editor: E,
    runtime: R,
    paths: Box<dyn PathAdapter>,
    store: ConfigStore,
    session: Mutex<SessionState>,
    options: EngineOptions,
    in_flight: AtomicBool,
    scheduled: Mutex<Vec<ScheduledTask>>,
}

impl<E: EditorHost, R: RuntimeClient> TransitionEngine<E, R> {
    pub fn new(
        editor: E,
        runtime: R,
        paths: Box<dyn PathAdapter>,
        store: ConfigStore,
        session: SessionState,
        options: EngineOptions,
    ) -> Self {
        Self {
            editor,
            runtime,
            paths,
            store,
            session: Mutex::new(session),
            options,
            in_flight: AtomicBool::new(false),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub async fn session(&self) -> SessionSnapshot {
        let session = self.session.lock().await;
        SessionSnapshot {
            last_workspace_folder: session.last_workspace_folder().map(Path::to_path_buf),
            pending_workspace_change: session.pending_workspace_change().map(Path::to_path_buf),
        }
    }

    fn begin(&self) -> Result<InFlight<'_>> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(TransitionError::SwitchInProgress.into());
        }
        Ok(InFlight(&self.in_flight))
    }

    /// Surface a message to the operator and log it
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => info!("{}", message),
            NoticeLevel::Warning | NoticeLevel::Error => warn!("{}", message),
        }
        self.editor.notify(level, message);
    }

    fn host_path_of(&self, path: &Path) -> PathBuf {
        if self.paths.looks_like_workspace_namespace_path(path) {
            self.paths.to_host_namespace(path)
        } else {
            path.to_path_buf()
        }
    }

    fn current_host_folder(&self) -> Option<PathBuf> {
        self.editor
            .current_folder()
            .map(|folder| self.host_path_of(&folder))
    }

    /// Switch the editor to `target`.
    ///
    /// Outside an environment with a pending switch queued, this completes the
    /// pending switch (an explicit target replaces it first). Outside an
    /// environment without one, it is a plain folder open.
    #[instrument(skip_all, fields(target = ?target.as_ref().map(|t| t.host_path().display().to_string())))]
    pub async fn request_switch(&self, target: Option<WorkspaceTarget>) -> Result<TransitionResult> {
        let _guard = self.begin()?;
        let mut tracker = Tracker::new("switch");
        let result = self.switch(target, &mut tracker).await;
        tracker.finish(&result);
        result
    }

    async fn switch(
        &self,
        target: Option<WorkspaceTarget>,
        tracker: &mut Tracker,
    ) -> Result<TransitionResult> {
        let pending = self
            .session
            .lock()
            .await
            .pending_workspace_change()
            .map(Path::to_path_buf);

        if !self.editor.is_in_environment() {
            if let Some(pending) = pending {
                let target = match target {
                    Some(explicit) => {
                        if self.host_path_of(&pending) != explicit.host_path() {
                            info!(
                                pending = %pending.display(),
                                requested = %explicit.host_path().display(),
                                "Replacing pending workspace change with explicit target"
                            );
                            self.session
                                .lock()
                                .await
                                .set_pending_workspace_change(explicit.host_path())?;
                        }
                        explicit
                    }
                    None => WorkspaceTarget::new(self.host_path_of(&pending)),
                };
                return self.complete_pending(&target, tracker).await;
            }

            let target = target.ok_or(TransitionError::NoWorkspace)?;
            info!(folder = %target.host_path().display(), "Opening folder outside any environment");
            self.editor.open_folder(target.host_path()).await?;
            tracker.enter(TransitionState::FolderOpened);
            return Ok(TransitionResult::FolderOpened {
                folder: target.host_path().to_path_buf(),
            });
        }

        let target = target
            .or_else(|| pending.map(|p| WorkspaceTarget::new(self.host_path_of(&p))))
            .ok_or(TransitionError::NoWorkspace)?;

        tracker.enter(TransitionState::ResolvingTarget);
        let resolved = self.resolve_target(&target)?;

        tracker.enter(TransitionState::ConflictCheck);
        match self.check_conflicts(&resolved.environment.name).await? {
            ConflictVerdict::NothingRunning | ConflictVerdict::AlreadyRunning => {
                self.materialize(&target, &resolved)?;
                let result = self.attach(&target, &resolved, tracker).await?;
                self.clear_superseded_pending().await?;
                Ok(result)
            }
            ConflictVerdict::Conflict(conflicting) => {
                self.resolve_conflict_by_detaching(&target, &resolved, conflicting, tracker)
                    .await
            }
        }
    }

    async fn complete_pending(
        &self,
        target: &WorkspaceTarget,
        tracker: &mut Tracker,
    ) -> Result<TransitionResult> {
        info!(target = %target.host_path().display(), "Completing pending workspace change");
        tracker.enter(TransitionState::DirectAttach);

        // Descriptors were materialized when the switch was queued; only read here
        let resolved = self.read_target(target);
        let result = self.attach(target, &resolved, tracker).await?;

        self.session.lock().await.clear_pending_workspace_change()?;
        Ok(result)
    }

    /// Attach to `target` from wherever the editor currently is.
    ///
    /// Inside an environment this is the same as [`Self::request_switch`]. On the
    /// host there is no session to detach, so confirmed conflicts are stopped and
    /// the attach happens in the same call. Without a target the editor's current
    /// folder is used.
    #[instrument(skip_all)]
    pub async fn request_attach(&self, target: Option<WorkspaceTarget>) -> Result<TransitionResult> {
        let target = match target {
            Some(target) => target,
            None => WorkspaceTarget::new(
                self.current_host_folder()
                    .ok_or(TransitionError::NoWorkspace)?,
            ),
        };

        if self.editor.is_in_environment() {
            return self.request_switch(Some(target)).await;
        }

        let _guard = self.begin()?;
        let mut tracker = Tracker::new("attach");
        let result = self.attach_from_host(&target, &mut tracker).await;
        tracker.finish(&result);
        result
    }

    async fn attach_from_host(
        &self,
        target: &WorkspaceTarget,
        tracker: &mut Tracker,
    ) -> Result<TransitionResult> {
        tracker.enter(TransitionState::ResolvingTarget);
        let resolved = self.resolve_target(target)?;

        tracker.enter(TransitionState::ConflictCheck);
        if let ConflictVerdict::Conflict(conflicting) =
            self.check_conflicts(&resolved.environment.name).await?
        {
            tracker.enter(TransitionState::AwaitingConfirmation);
            if !self.confirm_conflict(&resolved.environment.name, &conflicting).await {
                return Ok(self.cancelled(conflicting));
            }
            self.materialize(target, &resolved)?;
            tracker.enter(TransitionState::StoppingConflicts);
            self.stop_in_order(&conflicting).await?;
        } else {
            self.materialize(target, &resolved)?;
        }

        let result = self.attach(target, &resolved, tracker).await?;
        self.clear_superseded_pending().await?;
        Ok(result)
    }

    /// A completed attach consumes whatever switch was still queued
    async fn clear_superseded_pending(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.pending_workspace_change().is_some() {
            debug!("Attach superseded the pending workspace change");
            session.clear_pending_workspace_change()?;
        }
        Ok(())
    }

    /// Leave the current environment by reopening the host-side folder
    #[instrument(skip_all)]
    pub async fn request_detach(&self) -> Result<TransitionResult> {
        let _guard = self.begin()?;

        if !self.editor.is_in_environment() {
            debug!("Not inside an environment, nothing to detach");
            return Ok(TransitionResult::Detached { folder: None });
        }

        let folder = self.detach().await?;
        Ok(TransitionResult::Detached {
            folder: Some(folder),
        })
    }

    /// Stop the named environments after confirmation.
    ///
    /// Environments that are absent or already stopped are skipped. The first
    /// failure aborts the sequence.
    #[instrument(skip_all, fields(count = names.len()))]
    pub async fn request_stop(&self, names: &[String]) -> Result<TransitionResult> {
        let _guard = self.begin()?;

        if names.is_empty() {
            return Ok(TransitionResult::Stopped {
                stopped: Vec::new(),
                skipped: Vec::new(),
            });
        }

        let message = "Stop the following environments?";
        if !self.editor.confirm(message, names).await {
            return Ok(self.cancelled(names.to_vec()));
        }

        let mut to_stop = Vec::new();
        let mut skipped = Vec::new();
        for name in names {
            match self.runtime.inspect(name).await? {
                Some(env) if env.is_running() => to_stop.push(name.clone()),
                Some(env) => {
                    debug!(environment = %name, status = %env.status, "Already stopped, skipping");
                    skipped.push(name.clone());
                }
                None => {
                    debug!(environment = %name, "Not found, skipping");
                    skipped.push(name.clone());
                }
            }
        }

        let stopped = self.stop_in_order(&to_stop).await?;
        Ok(TransitionResult::Stopped { stopped, skipped })
    }

    /// Ensure `folder` has descriptors, generating them if absent
    pub fn prepare(&self, folder: &Path) -> Result<ResolvedTarget> {
        let _guard = self.begin()?;
        let target = WorkspaceTarget::new(folder);
        let resolved = self.resolve_target(&target)?;
        self.materialize(&target, &resolved)?;
        Ok(resolved)
    }

    /// Fresh list of environments carrying the configured prefix
    pub async fn list_environments(&self) -> Result<Vec<RunningEnvironment>> {
        self.runtime
            .list_environments(&self.options.name_prefix)
            .await
    }

    /// Wait for all scheduled cleanups to run
    pub async fn flush_scheduled(&self) {
        let tasks: Vec<ScheduledTask> = self.scheduled.lock().await.drain(..).collect();
        for task in tasks {
            let name = task.name().to_string();
            if !task.wait().await {
                debug!(task = %name, "Scheduled task did not complete");
            }
        }
    }

    /// Cancel all scheduled cleanups that have not run yet
    pub async fn cancel_scheduled(&self) {
        for task in self.scheduled.lock().await.drain(..) {
            task.cancel();
        }
    }

    fn read_target(&self, target: &WorkspaceTarget) -> ResolvedTarget {
        let folder = target.host_path();
        let environment = self
            .store
            .read_environment_descriptor(folder)
            .unwrap_or_else(|| self.store.synthesize(folder, self.paths.as_ref()).0);
        ResolvedTarget::on_disk(environment, self.store.read_workspace_descriptor(folder))
    }

    /// Read the target's descriptors, generating what is missing in memory.
    ///
    /// Nothing is written here; see [`Self::materialize`]. Generation only
    /// covers absent files. A hand-written environment descriptor is used as is;
    /// a hand-written workspace descriptor is never reused or overwritten.
    fn resolve_target(&self, target: &WorkspaceTarget) -> Result<ResolvedTarget> {
        let folder = target.host_path();
        if !folder.is_dir() {
            warn!(folder = %folder.display(), "Target folder does not exist");
            return Err(TransitionError::NoWorkspace.into());
        }

        let existing_workspace = self.store.read_workspace_descriptor(folder);

        if let Some(environment) = self.store.read_environment_descriptor(folder) {
            if existing_workspace.is_none() && self.store.is_owned_by_this_system(&environment) {
                // Repair after an earlier partial write
                let workspace = self.store.workspace_for(&environment);
                return Ok(ResolvedTarget {
                    unwritten_workspace: true,
                    ..ResolvedTarget::on_disk(environment, Some(workspace))
                });
            }
            return Ok(ResolvedTarget::on_disk(environment, existing_workspace));
        }

        info!(folder = %folder.display(), "No environment descriptor, generating defaults");
        let (environment, generated) = self.store.synthesize(folder, self.paths.as_ref());
        let (workspace, unwritten_workspace) = match existing_workspace {
            Some(existing) if !self.store.is_owned_by_this_system(&existing) => {
                info!("Leaving hand-written workspace descriptor untouched");
                (existing, false)
            }
            _ => (generated, true),
        };

        Ok(ResolvedTarget {
            environment,
            workspace: Some(workspace),
            synthesized: true,
            unwritten_environment: true,
            unwritten_workspace,
        })
    }

    /// Write descriptors generated by [`Self::resolve_target`]
    fn materialize(&self, target: &WorkspaceTarget, resolved: &ResolvedTarget) -> Result<()> {
        let folder = target.host_path();
        let workspace = resolved
            .workspace
            .as_ref()
            .filter(|_| resolved.unwritten_workspace);
        if resolved.unwritten_environment {
            self.store
                .write_descriptors(folder, &resolved.environment, workspace)?;
        } else if let Some(workspace) = workspace {
            self.store.write_workspace_descriptor(folder, workspace)?;
        }
        Ok(())
    }

    async fn check_conflicts(&self, target_environment: &str) -> Result<ConflictVerdict> {
        // Always a fresh query: other actors start and stop environments
        let running = self.list_environments().await?;
        let verdict = classify(target_environment, &running, &self.options.name_prefix);
        debug!(environment = %target_environment, ?verdict, "Conflict check");
        Ok(verdict)
    }

    async fn confirm_conflict(&self, target_environment: &str, conflicting: &[String]) -> bool {
        let message = format!(
            "Switching to '{}' requires stopping running environments. Detach the current workspace, stop them, and proceed?",
            target_environment
        );
        self.editor.confirm(&message, conflicting).await
    }

    fn cancelled(&self, conflicting: Vec<String>) -> TransitionResult {
        self.notify(
            NoticeLevel::Info,
            "Workspace switch cancelled. No environment was stopped.",
        );
        TransitionResult::Cancelled { conflicting }
    }

    async fn resolve_conflict_by_detaching(
        &self,
        target: &WorkspaceTarget,
        resolved: &ResolvedTarget,
        conflicting: Vec<String>,
        tracker: &mut Tracker,
    ) -> Result<TransitionResult> {
        // Fail before prompting if there is nothing to detach to
        if self.editor.current_folder().is_none() {
            return Err(TransitionError::NoWorkspace.into());
        }

        tracker.enter(TransitionState::AwaitingConfirmation);
        if !self
            .confirm_conflict(&resolved.environment.name, &conflicting)
            .await
        {
            return Ok(self.cancelled(conflicting));
        }
        self.materialize(target, resolved)?;

        tracker.enter(TransitionState::Detaching);
        self.detach().await?;

        tracker.enter(TransitionState::StoppingConflicts);
        let stopped = self.stop_in_order(&conflicting).await?;

        self.session
            .lock()
            .await
            .set_pending_workspace_change(target.host_path())?;
        tracker.enter(TransitionState::PendingSwitchStored);

        self.notify(
            NoticeLevel::Info,
            &format!(
                "Detached and stopped {}. Run the switch again to attach to '{}'.",
                stopped.join(", "),
                resolved.environment.name
            ),
        );

        Ok(TransitionResult::PendingSwitchStored {
            target: target.host_path().to_path_buf(),
            stopped,
        })
    }

    async fn detach(&self) -> Result<PathBuf> {
        let folder = self
            .current_host_folder()
            .ok_or(TransitionError::NoWorkspace)?;

        self.session
            .lock()
            .await
            .set_last_workspace_folder(&folder)?;

        info!(folder = %folder.display(), "Detaching editor to host folder");
        self.editor.open_folder(&folder).await?;
        Ok(folder)
    }

    /// Stop `names` in order; the first failure aborts the rest
    async fn stop_in_order(&self, names: &[String]) -> Result<Vec<String>> {
        let mut stopped = Vec::new();
        for (index, name) in names.iter().enumerate() {
            if let Err(e) = self.runtime.stop(name).await {
                let message = match e {
                    DocksideError::Transition(TransitionError::EnvironmentStop { message, .. }) => {
                        message
                    }
                    other => other.to_string(),
                };
                let untouched = &names[index + 1..];
                warn!(
                    environment = %name,
                    stopped = ?stopped,
                    untouched = ?untouched,
                    "Failed to stop environment: {}",
                    message
                );

                let mut notice = format!("Could not stop '{}'.", name);
                if !stopped.is_empty() {
                    notice.push_str(&format!(" Stopped: {}.", stopped.join(", ")));
                }
                if !untouched.is_empty() {
                    notice.push_str(&format!(" Still running: {}.", untouched.join(", ")));
                }
                self.notify(NoticeLevel::Error, &notice);

                return Err(TransitionError::EnvironmentStop {
                    name: name.clone(),
                    message,
                }
                .into());
            }
            info!(environment = %name, "Stopped environment");
            stopped.push(name.clone());
        }
        Ok(stopped)
    }

    async fn attach(
        &self,
        target: &WorkspaceTarget,
        resolved: &ResolvedTarget,
        tracker: &mut Tracker,
    ) -> Result<TransitionResult> {
        tracker.enter(TransitionState::Attaching);
        let environment = &resolved.environment;

        if let Some(existing) = self.runtime.inspect(&environment.name).await? {
            if !existing.is_running() {
                info!(environment = %environment.name, status = %existing.status, "Starting environment before attach");
                self.runtime.start(&environment.name).await?;
            }
        }

        let workspace_path = target.workspace_path(self.paths.as_ref());
        let uri = self.runtime.attach_uri(&workspace_path).await?;

        let attach_target = match &resolved.workspace {
            Some(workspace) if self.store.is_owned_by_this_system(workspace) => {
                let file = ConfigStore::workspace_descriptor_path(target.host_path());
                AttachTarget::WorkspaceFile(self.paths.to_workspace_namespace(&file))
            }
            _ => AttachTarget::Folder,
        };

        let transient = if self.options.suppress_attach_prompt {
            match self.store.create_transient(environment) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("Could not write transient attach descriptor: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let request = AttachRequest {
            uri,
            environment: environment.name.clone(),
            target: attach_target,
        };
        info!(environment = %request.environment, uri = %request.uri, "Attaching");

        if let Err(e) = self.editor.open_in_environment(&request).await {
            if let Some(handle) = &transient {
                if let Err(cleanup) = ConfigStore::remove_transient(handle) {
                    warn!("Failed to remove transient attach descriptor: {}", cleanup);
                }
            }
            return Err(TransitionError::Attach {
                message: e.to_string(),
            }
            .into());
        }

        // The attach call returns before the environment is reachable
        tracker.enter(TransitionState::Settling);
        tokio::time::sleep(self.options.settle).await;

        if let Some(handle) = transient.filter(|h| !h.preexisting) {
            let task = ScheduledTask::after(
                format!("remove-transient:{}", environment.name),
                self.options.cleanup_margin,
                move || {
                    if let Err(e) = ConfigStore::remove_transient(&handle) {
                        warn!(path = %handle.path.display(), "Failed to remove transient attach descriptor: {}", e);
                    }
                },
            );
            self.scheduled.lock().await.push(task);
        }

        tracker.enter(TransitionState::Attached);
        self.notify(
            NoticeLevel::Info,
            &format!("Attached to '{}'.", environment.name),
        );
        Ok(TransitionResult::Attached {
            folder: target.host_path().to_path_buf(),
            environment: environment.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EnvironmentStatus;

    fn env(name: &str, status: EnvironmentStatus) -> RunningEnvironment {
        RunningEnvironment::new(name, status, "img")
    }

    #[test]
    fn test_classify_nothing_running() {
        assert_eq!(
            classify("dockside-v2", &[], "dockside-"),
            ConflictVerdict::NothingRunning
        );
    }

    #[test]
    fn test_classify_exact_match_wins() {
        let running = vec![
            env("dockside-v1", EnvironmentStatus::Running),
            env("dockside-v2", EnvironmentStatus::Running),
        ];
        assert_eq!(
            classify("dockside-v2", &running, "dockside-"),
            ConflictVerdict::AlreadyRunning
        );
    }

    #[test]
    fn test_classify_other_version_conflicts() {
        let running = vec![env("dockside-v1", EnvironmentStatus::Running)];
        assert_eq!(
            classify("dockside-v2", &running, "dockside-"),
            ConflictVerdict::Conflict(vec!["dockside-v1".to_string()])
        );
    }

    #[test]
    fn test_classify_ignores_stopped_and_unprefixed() {
        let running = vec![
            env("dockside-v1", EnvironmentStatus::Exited),
            env("postgres", EnvironmentStatus::Running),
        ];
        assert_eq!(
            classify("dockside-v2", &running, "dockside-"),
            ConflictVerdict::NothingRunning
        );
    }

    #[test]
    fn test_classify_unprefixed_target_conflicts_with_all() {
        let running = vec![env("dockside-v1", EnvironmentStatus::Running)];
        assert_eq!(
            classify("custom-env", &running, "dockside-"),
            ConflictVerdict::Conflict(vec!["dockside-v1".to_string()])
        );
    }

    #[test]
    fn test_workspace_target_derived_fields() {
        let target = WorkspaceTarget::new("/src/project-a");
        assert_eq!(target.project_name(), "project-a");
        assert_eq!(
            target.workspace_path(&crate::paths::NativePaths),
            PathBuf::from("/src/project-a")
        );
    }

    #[test]
    fn test_terminal_states() {
        assert_eq!(
            TransitionResult::Cancelled {
                conflicting: vec![]
            }
            .terminal_state(),
            TransitionState::Cancelled
        );
        assert_eq!(
            TransitionResult::Attached {
                folder: PathBuf::from("/a"),
                environment: "e".to_string()
            }
            .terminal_state(),
            TransitionState::Attached
        );
    }
}
