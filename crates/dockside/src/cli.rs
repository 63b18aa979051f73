use crate::commands::{self, CommandContext};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use dockside_core::paths::Platform;
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Platform override
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PlatformOption {
    Linux,
    Macos,
    Windows,
    Wsl,
}

impl From<PlatformOption> for Platform {
    fn from(platform: PlatformOption) -> Self {
        match platform {
            PlatformOption::Linux => Platform::Linux,
            PlatformOption::Macos => Platform::MacOS,
            PlatformOption::Windows => Platform::Windows,
            PlatformOption::Wsl => Platform::Wsl,
        }
    }
}

/// dockside subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Attach the editor to the environment a folder is bound to
    ///
    /// Running environments of other versions are stopped after confirmation.
    Attach {
        /// Project folder (defaults to the editor's current folder)
        folder: Option<PathBuf>,
    },
    /// Leave the current environment and reopen the folder on the host
    Detach,
    /// Switch the editor to another project folder
    ///
    /// Inside an environment, a conflicting environment is stopped after
    /// detaching and the switch completes on the next invocation. Without a
    /// folder, a pending switch is completed.
    Switch {
        /// Project folder to switch to
        folder: Option<PathBuf>,
    },
    /// Stop environments managed by dockside
    Stop {
        /// Environment names (defaults to every running environment with the prefix)
        names: Vec<String>,
    },
    /// Show session state and managed environments
    Status {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Generate descriptors for a folder that has none
    Init {
        /// Project folder (defaults to the current directory)
        folder: Option<PathBuf>,
    },
}

/// Switch editor workspaces between containerized environments
#[derive(Debug, Parser)]
#[command(name = "dockside")]
#[command(about = "Switch editor workspaces between containerized environments")]
#[command(version)]
pub struct Cli {
    /// Log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Container runtime binary (overrides DOCKSIDE_RUNTIME and the settings file)
    #[arg(long, global = true)]
    pub runtime: Option<String>,

    /// Environment name prefix (overrides DOCKSIDE_PREFIX and the settings file)
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Editor command line (overrides DOCKSIDE_EDITOR and the settings file)
    #[arg(long, global = true)]
    pub editor: Option<String>,

    /// Platform to translate paths for (detected when omitted)
    #[arg(long, global = true, value_enum)]
    pub platform: Option<PlatformOption>,

    /// Session state file (defaults to the per-user data directory)
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    /// Folder the editor currently has open (defaults to the working directory)
    #[arg(long, global = true)]
    pub current_folder: Option<PathBuf>,

    /// Treat the session as running inside an environment
    #[arg(long, global = true)]
    pub in_environment: bool,

    /// Answer confirmation prompts with yes
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Initialize logging, assemble the command surface and run the subcommand.
    ///
    /// Returns the process exit code: 0 for success or cancellation, 1 when the
    /// command failed.
    pub async fn dispatch(self) -> Result<i32> {
        let log_format = self.log_format.map(|f| match f {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        });
        let log_level = self.log_level.as_str();

        if std::env::var_os("DOCKSIDE_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("dockside={},dockside_core={}", log_level, log_level),
            );
        }
        dockside_core::logging::init(log_format)?;
        let format = dockside_core::logging::LogFormat::resolve(log_format);
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let Some(command) = self.command else {
            println!("dockside - switch editor workspaces between containerized environments");
            println!("Run 'dockside --help' for usage information");
            return Ok(0);
        };

        let context = CommandContext {
            settings_path: self.settings,
            runtime: self.runtime,
            prefix: self.prefix,
            editor: self.editor,
            platform: self.platform.map(Into::into),
            session_file: self.session_file,
            current_folder: self.current_folder,
            in_environment: self.in_environment,
            assume_yes: self.yes,
            json_logs: format == dockside_core::logging::LogFormat::Json,
        };

        commands::run(command, context).await
    }
}
