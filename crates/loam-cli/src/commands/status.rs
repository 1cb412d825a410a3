use std::path::Path;

use loam_core::db::QueueRepository;
use serde::Serialize;

use crate::commands::common::{current_user, open_queue, remote_from_env, REMOTE_URL_ENV};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusInfo {
    db_path: String,
    user: String,
    pending_changes: usize,
    remote_configured: bool,
    remote_url: Option<String>,
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (_db, queue) = open_queue(db_path).await?;
    let pending = queue.pending_count().await?;

    let remote_url = match remote_from_env()? {
        Some(_) => std::env::var(REMOTE_URL_ENV).ok(),
        None => None,
    };

    let info = StatusInfo {
        db_path: db_path.display().to_string(),
        user: current_user(),
        pending_changes: pending,
        remote_configured: remote_url.is_some(),
        remote_url,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Database: {}", info.db_path);
    println!("User: {}", info.user);
    println!("Pending changes: {}", info.pending_changes);
    match &info.remote_url {
        Some(url) => println!("Remote: {url}"),
        None => println!("Remote: not configured (set {REMOTE_URL_ENV})"),
    }
    Ok(())
}
