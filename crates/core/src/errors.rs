//! Error types and handling
//!
//! Each collaborator of the transition engine owns a small error enum; they are
//! wrapped by [`DocksideError`] so callers can use a single `Result` alias while
//! the engine still decides fatal-vs-recoverable per variant.

use thiserror::Error;

/// Descriptor (environment / workspace file) errors
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// Descriptor content could not be parsed. Readers degrade this to "absent".
    #[error("Failed to parse descriptor {path}: {message}")]
    Parse { path: String, message: String },

    /// Descriptor could not be serialized
    #[error("Failed to serialize descriptor: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Descriptor write failed. `written` lists files that did land on disk.
    #[error("Failed to write descriptor {path}: {message}")]
    Write {
        path: String,
        message: String,
        written: Vec<String>,
    },

    /// Descriptor file I/O error
    #[error("Descriptor I/O error")]
    Io(#[from] std::io::Error),
}

/// Container runtime CLI errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Runtime binary missing or not executable
    #[error("Container runtime is not installed or not accessible")]
    NotInstalled,

    /// Runtime command exited non-zero or produced unreadable output
    #[error("Container runtime CLI error: {0}")]
    Cli(String),

    /// Environment name rejected before reaching the CLI
    #[error("Invalid environment name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Errors surfaced by the transition engine to the command surface
#[derive(Error, Debug)]
pub enum TransitionError {
    /// No folder context where one is required
    #[error("No workspace folder is open")]
    NoWorkspace,

    /// A conflicting environment could not be stopped. Environments after it
    /// in the sequence were left untouched.
    #[error("Failed to stop environment '{name}': {message}")]
    EnvironmentStop { name: String, message: String },

    /// The editor's attach primitive failed
    #[error("Failed to attach to environment: {message}")]
    Attach { message: String },

    /// The bridging identifier for the attach URI could not be determined
    #[error("Failed to resolve attach bridge: {message}")]
    BridgeResolution { message: String },

    /// Another switch request is still in flight
    #[error("A workspace switch is already in progress")]
    SwitchInProgress,
}

/// Settings file errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("Failed to read settings file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for the settings schema
    #[error("Failed to parse settings file {path}: {message}")]
    Parse { path: String, message: String },
}

/// Session state persistence errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Backing store could not be read or written
    #[error("Session store error at {path}: {message}")]
    Store { path: String, message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum DocksideError {
    /// Descriptor errors
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Container runtime errors
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Transition errors
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// Settings errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Editor host errors other than attach failures
    #[error("Editor error: {0}")]
    Editor(String),
}

impl DocksideError {
    /// Name of the environment a stop failure refers to, if any
    pub fn failed_environment(&self) -> Option<&str> {
        match self {
            Self::Transition(TransitionError::EnvironmentStop { name, .. }) => Some(name),
            _ => None,
        }
    }
}

/// Convenience type alias for Results with DocksideError
pub type Result<T> = std::result::Result<T, DocksideError>;
