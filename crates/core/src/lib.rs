//! Core library for dockside
//!
//! This crate contains the workspace transition engine and its collaborators:
//! path translation, the container runtime client, descriptor storage, session
//! state, settings, logging and error handling.

pub mod descriptor;
pub mod editor;
pub mod errors;
pub mod logging;
pub mod paths;
pub mod runtime;
pub mod schedule;
pub mod session;
pub mod settings;
pub mod surface;
pub mod transition;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
