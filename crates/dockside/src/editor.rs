//! Editor host backed by the editor's command line
//!
//! Windows are opened through the editor CLI (`code --folder-uri …`), prompts
//! and notices go to the terminal on stderr.

use crate::ui::spinner::PlainSpinner;
use console::{style, Term};
use dockside_core::editor::{AttachRequest, AttachTarget, EditorHost, NoticeLevel};
use dockside_core::errors::{DocksideError, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::{debug, instrument};

/// Environment variable the editor sets inside attached environments
pub const IN_ENVIRONMENT_VAR: &str = "REMOTE_CONTAINERS";

/// How confirmations are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Ask on the terminal; a non-interactive stdin cancels
    Prompt,
    /// Confirm without asking (`--yes`)
    AssumeYes,
}

#[derive(Debug)]
struct WindowState {
    in_environment: bool,
    current_folder: Option<PathBuf>,
}

/// [`EditorHost`] that shells out to the editor CLI
#[derive(Debug)]
pub struct CodeEditor {
    program: String,
    base_args: Vec<String>,
    confirm_mode: ConfirmMode,
    show_spinner: bool,
    window: Mutex<WindowState>,
    settling: Mutex<Option<PlainSpinner>>,
}

impl CodeEditor {
    /// Build from a shell-style command line such as `code --wait`
    pub fn new(
        command_line: &str,
        in_environment: bool,
        current_folder: Option<PathBuf>,
        confirm_mode: ConfirmMode,
        show_spinner: bool,
    ) -> anyhow::Result<Self> {
        let mut words = shell_words::split(command_line)?;
        if words.is_empty() {
            anyhow::bail!("Editor command is empty");
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            base_args: words,
            confirm_mode,
            show_spinner,
            window: Mutex::new(WindowState {
                in_environment,
                current_folder,
            }),
            settling: Mutex::new(None),
        })
    }

    /// Whether the process runs inside an attached environment
    pub fn detect_in_environment() -> bool {
        std::env::var(IN_ENVIRONMENT_VAR)
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    }

    fn window(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_spinner(&self) -> Option<PlainSpinner> {
        self.settling
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        let program = self.program.clone();
        let mut full_args = self.base_args.clone();
        full_args.extend(args);
        debug!("Running editor: {} {:?}", program, full_args);

        let output = tokio::task::spawn_blocking(move || {
            Command::new(&program).args(&full_args).output().map_err(|e| {
                DocksideError::Editor(format!("Failed to launch editor '{}': {}", program, e))
            })
        })
        .await
        .map_err(|e| DocksideError::Editor(format!("Editor task failed: {}", e)))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DocksideError::Editor(if stderr.is_empty() {
                format!("Editor exited with {}", output.status)
            } else {
                stderr
            }));
        }
        Ok(())
    }
}

/// Hex-encode bytes, lowercase
fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Remote URI for an attached container.
///
/// The authority carries the hex-encoded container reference; a bridge
/// authority such as `wsl+Ubuntu` is added to that reference.
pub fn attached_container_uri(environment: &str, bridge: Option<&str>, path: &Path) -> String {
    let mut reference = serde_json::json!({ "containerName": format!("/{}", environment) });
    if let Some(bridge) = bridge {
        reference["settings"] = serde_json::json!({ "host": bridge });
    }
    let path = path.to_string_lossy().replace('\\', "/");
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };
    format!(
        "vscode-remote://attached-container+{}{}",
        hex(reference.to_string().as_bytes()),
        path
    )
}

impl EditorHost for CodeEditor {
    fn is_in_environment(&self) -> bool {
        self.window().in_environment
    }

    fn current_folder(&self) -> Option<PathBuf> {
        self.window().current_folder.clone()
    }

    #[instrument(skip(self))]
    async fn open_folder(&self, host_path: &Path) -> Result<()> {
        self.run(vec![
            "--reuse-window".to_string(),
            host_path.display().to_string(),
        ])
        .await?;
        let mut window = self.window();
        window.in_environment = false;
        window.current_folder = Some(host_path.to_path_buf());
        Ok(())
    }

    #[instrument(skip_all, fields(environment = %request.environment))]
    async fn open_in_environment(&self, request: &AttachRequest) -> Result<()> {
        let bridge = request.uri.authority.as_deref();
        let args = match &request.target {
            AttachTarget::Folder => vec![
                "--folder-uri".to_string(),
                attached_container_uri(&request.environment, bridge, &request.uri.path),
            ],
            AttachTarget::WorkspaceFile(file) => vec![
                "--file-uri".to_string(),
                attached_container_uri(&request.environment, bridge, file),
            ],
        };
        self.run(args).await?;

        {
            let mut window = self.window();
            window.in_environment = true;
            window.current_folder = Some(request.uri.path.clone());
        }

        if self.show_spinner {
            let spinner =
                PlainSpinner::start(&format!("Waiting for '{}' to settle…", request.environment));
            *self.settling.lock().unwrap_or_else(|e| e.into_inner()) = Some(spinner);
        }
        Ok(())
    }

    async fn confirm(&self, message: &str, detail: &[String]) -> bool {
        // A prompt must not render under a running spinner
        drop(self.take_spinner());

        if self.confirm_mode == ConfirmMode::AssumeYes {
            debug!("Confirmation assumed by --yes");
            return true;
        }
        if !std::io::stdin().is_terminal() {
            eprintln!(
                "{} {} (stdin is not interactive; pass --yes to confirm)",
                style("?").yellow(),
                message
            );
            return false;
        }

        let mut prompt = format!("{} {}\n", style("?").yellow().bold(), message);
        for item in detail {
            prompt.push_str(&format!("    - {}\n", item));
        }
        prompt.push_str("  Proceed? [y/N] ");

        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let term = Term::stderr();
            term.write_str(&prompt)?;
            term.read_line()
        })
        .await;

        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            Ok(Err(e)) => {
                debug!("Confirmation prompt failed: {}", e);
                false
            }
            Err(e) => {
                debug!("Confirmation task failed: {}", e);
                false
            }
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        match (self.take_spinner(), level) {
            (Some(spinner), NoticeLevel::Info) => spinner.finish_with_message(message),
            (Some(spinner), _) => spinner.fail_with_message(message),
            (None, NoticeLevel::Info) => eprintln!("{}", message),
            (None, NoticeLevel::Warning) => eprintln!("{} {}", style("warning:").yellow(), message),
            (None, NoticeLevel::Error) => eprintln!("{} {}", style("error:").red(), message),
        }
    }
}
