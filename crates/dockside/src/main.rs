use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod editor;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    // Failed commands exit 1; cancelled and successful ones exit 0
    let code = parsed.dispatch().await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
