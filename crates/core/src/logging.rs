//! Logging setup
//!
//! Structured logging goes through `tracing`. Output is always written to stderr
//! so stdout stays free for command results. Text and JSON formats are selected at
//! runtime from the CLI flag or `DOCKSIDE_LOG_FORMAT`; the filter comes from
//! `DOCKSIDE_LOG`, then `RUST_LOG`, then defaults to `info`.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Format from `requested`, else `DOCKSIDE_LOG_FORMAT`, else text
    pub fn resolve(requested: Option<&str>) -> Self {
        let env_format = std::env::var("DOCKSIDE_LOG_FORMAT").ok();
        match requested.or(env_format.as_deref()) {
            Some("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Initialize the logging system.
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// ```rust
/// use dockside_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();
        let effective = LogFormat::resolve(format);

        match effective {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(false)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {:?}", effective);
    });

    Ok(())
}

fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var("DOCKSIDE_LOG") {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!("Invalid DOCKSIDE_LOG filter '{}', using 'info'", spec);
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
