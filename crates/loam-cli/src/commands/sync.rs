use std::path::Path;
use std::sync::Arc;

use loam_core::sync::{LocalChangeTracker, NetworkMonitor, SyncEngine};

use crate::commands::common::{open_queue, remote_from_env};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let Some(remote) = remote_from_env()? else {
        return Err(CliError::SyncNotConfigured);
    };

    let (_db, queue) = open_queue(db_path).await?;
    // One-shot drain: the CLI process is online by definition of being here
    let monitor = NetworkMonitor::new(true);
    let engine = SyncEngine::new(
        Arc::new(queue),
        remote,
        Arc::new(LocalChangeTracker::new()),
        monitor.subscribe(),
    );

    let report = engine.process_queue().await?;
    engine.shutdown();

    if report.synced > 0 {
        println!("Synced {} changes", report.synced);
    }
    if report.failed > 0 {
        println!("Failed to sync {} changes (will retry)", report.failed);
    }
    if report.dropped > 0 {
        println!(
            "Dropped {} changes that exhausted their retries",
            report.dropped
        );
    }
    if report.synced == 0 && report.failed == 0 && report.dropped == 0 {
        println!("Nothing to sync");
    }
    Ok(())
}
