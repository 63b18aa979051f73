//! Status rendering

use crate::cli::OutputFormat;
use anyhow::Result;
use console::style;
use dockside_core::surface::StatusReport;
use std::path::Path;

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Text rendering of a status report
pub fn render_text(report: &StatusReport) -> String {
    let mut out = String::new();
    let location = if report.in_environment {
        "inside an environment"
    } else {
        "on the host"
    };
    out.push_str(&format!("Session:        {}\n", location));
    out.push_str(&format!(
        "Current folder: {}\n",
        display_path(report.current_folder.as_deref())
    ));
    out.push_str(&format!(
        "Last folder:    {}\n",
        display_path(report.session.last_workspace_folder.as_deref())
    ));
    out.push_str(&format!(
        "Pending switch: {}\n",
        display_path(report.session.pending_workspace_change.as_deref())
    ));

    if report.environments.is_empty() {
        out.push_str("Environments:   none\n");
    } else {
        out.push_str("Environments:\n");
        for env in &report.environments {
            let status = if env.is_running() {
                style(env.status.to_string()).green().to_string()
            } else {
                style(env.status.to_string()).dim().to_string()
            };
            out.push_str(&format!("  {:<28} {:<10} {}\n", env.name, status, env.image));
        }
    }
    out
}

pub fn render(report: &StatusReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print!("{}", render_text(report)),
    }
    Ok(())
}
