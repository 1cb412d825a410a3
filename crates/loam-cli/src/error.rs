use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] loam_core::Error),
    #[error(transparent)]
    Remote(#[from] loam_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Reset aborted; pass --yes to drop unsynced changes")]
    ResetNotConfirmed,
    #[error(
        "Sync is not configured. Set LOAM_REMOTE_URL (and optionally LOAM_REMOTE_TOKEN) to enable `loam sync`."
    )]
    SyncNotConfigured,
}
