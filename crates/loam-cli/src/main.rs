//! loam CLI - offline-first capture and sync from the terminal
//!
//! Notes queue locally with minimal friction and replay against the remote
//! store when connectivity allows.

mod cli;
mod commands;
mod error;

use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use cli::{Cli, Commands};
use commands::capture::run_capture;
use commands::completions::run_completions;
use commands::conflicts::run_conflicts;
use commands::queue::run_queue;
use commands::reset::run_reset;
use commands::status::run_status;
use commands::sync::run_sync;
use error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("loam=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Capture { content, title }) => {
            run_capture(&content, title.as_deref(), &db_path).await?;
        }
        Some(Commands::Queue { json }) => run_queue(json, &db_path).await?,
        Some(Commands::Sync) => run_sync(&db_path).await?,
        Some(Commands::Conflicts { limit, json }) => {
            run_conflicts(limit, json, &db_path).await?;
        }
        Some(Commands::Status { json }) => run_status(json, &db_path).await?,
        Some(Commands::Reset { yes }) => run_reset(yes, &db_path).await?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            // Quick capture mode: loam "my note"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_capture(&cli.note, None, &db_path).await?;
            }
        }
    }

    Ok(())
}

/// Default database location under the platform data directory
fn resolve_db_path(override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loam")
            .join("loam.db")
    })
}
