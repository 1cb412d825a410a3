use std::path::Path;

use loam_core::db::QueueRepository;

use crate::commands::common::{format_queue_lines, open_queue};
use crate::error::CliError;

pub async fn run_queue(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (_db, queue) = open_queue(db_path).await?;
    let pending = queue.dequeue_all().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    if pending.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_queue_lines(&pending) {
        println!("{line}");
    }
    Ok(())
}
