use std::path::Path;

use loam_core::db::QueueRepository;

use crate::commands::common::open_queue;
use crate::error::CliError;

pub async fn run_reset(confirmed: bool, db_path: &Path) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ResetNotConfirmed);
    }

    let (_db, queue) = open_queue(db_path).await?;
    let pending = queue.pending_count().await?;
    queue.clear().await?;

    println!("Dropped {pending} queued changes");
    Ok(())
}
