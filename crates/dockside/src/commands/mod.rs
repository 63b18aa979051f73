//! Command implementations
//!
//! Each subcommand assembles the same command surface from settings and CLI
//! overrides, runs one operation on it and maps the outcome to an exit code.

pub mod status;

use crate::cli::Commands;
use crate::editor::{CodeEditor, ConfirmMode};
use anyhow::{Context, Result};
use console::style;
use dockside_core::descriptor::ConfigStore;
use dockside_core::paths::Platform;
use dockside_core::runtime::{AttachBridge, CliRuntime};
use dockside_core::session::{FileStore, SessionState};
use dockside_core::settings::Settings;
use dockside_core::surface::{CommandResult, CommandSurface};
use dockside_core::transition::{EngineOptions, TransitionEngine};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Global options that shape how the surface is assembled
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub settings_path: Option<PathBuf>,
    pub runtime: Option<String>,
    pub prefix: Option<String>,
    pub editor: Option<String>,
    pub platform: Option<Platform>,
    pub session_file: Option<PathBuf>,
    pub current_folder: Option<PathBuf>,
    pub in_environment: bool,
    pub assume_yes: bool,
    pub json_logs: bool,
}

impl CommandContext {
    /// Settings with CLI flags applied over environment and file values
    pub fn resolve_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.settings_path.as_deref())?;
        if let Some(runtime) = &self.runtime {
            settings.runtime_path = runtime.clone();
        }
        if let Some(prefix) = &self.prefix {
            settings.name_prefix = prefix.clone();
        }
        if let Some(editor) = &self.editor {
            settings.editor_command = editor.clone();
        }
        if let Some(session_file) = &self.session_file {
            settings.session_file = Some(session_file.clone());
        }
        Ok(settings)
    }
}

type Surface = CommandSurface<CodeEditor, CliRuntime>;

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(path))
    }
}

fn session_path(settings: &Settings) -> PathBuf {
    settings
        .session_file
        .clone()
        .or_else(FileStore::default_path)
        .unwrap_or_else(|| std::env::temp_dir().join("dockside-session.json"))
}

fn build_surface(context: &CommandContext, settings: &Settings) -> Result<Surface> {
    let platform = context.platform.unwrap_or_else(Platform::detect);
    debug!(?platform, "Selected platform");

    let paths = platform.path_adapter(settings.wsl_default_distro.clone());
    let bridge = AttachBridge::for_platform(platform, settings.wsl_default_distro.clone());
    let runtime = CliRuntime::new(settings.runtime_path.clone(), bridge);

    let in_environment = context.in_environment || CodeEditor::detect_in_environment();
    let current_folder = match &context.current_folder {
        Some(folder) => Some(absolute(folder)?),
        None => std::env::current_dir().ok(),
    };
    let confirm_mode = if context.assume_yes {
        ConfirmMode::AssumeYes
    } else {
        ConfirmMode::Prompt
    };
    let show_spinner = std::io::stderr().is_terminal() && !context.json_logs;
    let editor = CodeEditor::new(
        &settings.editor_command,
        in_environment,
        current_folder,
        confirm_mode,
        show_spinner,
    )?;

    let store = ConfigStore::new(
        settings.system_id.clone(),
        settings.attach_config_dir(),
        settings.descriptor_defaults(),
    );
    let session = SessionState::load(FileStore::open(session_path(settings)));

    let engine = TransitionEngine::new(
        editor,
        runtime,
        paths,
        store,
        session,
        EngineOptions::from(settings),
    );
    Ok(CommandSurface::new(engine))
}

/// Print a command result and return the process exit code
fn report(result: &CommandResult) -> i32 {
    match result {
        CommandResult::Ok(message) => println!("{}", message),
        CommandResult::Cancelled => eprintln!("{}", style("Cancelled; nothing was changed").yellow()),
        CommandResult::Failed(reason) => eprintln!("{} {}", style("Error:").red().bold(), reason),
    }
    result.exit_code()
}

/// Run `command` and return the process exit code
pub async fn run(command: Commands, context: CommandContext) -> Result<i32> {
    let settings = context.resolve_settings()?;
    let surface = build_surface(&context, &settings)?;

    let result = match command {
        Commands::Attach { folder } => {
            let folder = folder.as_deref().map(absolute).transpose()?;
            surface.request_attach(folder).await
        }
        Commands::Detach => surface.request_detach().await,
        Commands::Switch { folder } => {
            let folder = folder.as_deref().map(absolute).transpose()?;
            surface.request_switch(folder).await
        }
        Commands::Stop { names } => surface.request_stop_conflicting(names).await,
        Commands::Status { output } => {
            let report = surface.status().await?;
            status::render(&report, output)?;
            return Ok(0);
        }
        Commands::Init { folder } => {
            let folder = match folder {
                Some(folder) => absolute(&folder)?,
                None => std::env::current_dir().context("Failed to read the current directory")?,
            };
            surface.init(&folder)
        }
    };

    // Transient descriptors are removed on a timer; let it fire before exiting
    if result.is_ok() {
        info!("Waiting for scheduled cleanup");
        surface.engine().flush_scheduled().await;
    } else {
        surface.engine().cancel_scheduled().await;
    }

    Ok(report(&result))
}
