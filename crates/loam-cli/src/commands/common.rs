//! Shared helpers for CLI commands: database/remote wiring, capture parsing,
//! and output formatting.

use std::path::Path;
use std::sync::Arc;

use loam_core::db::{Database, LibSqlConflictLog, LibSqlQueueRepository};
use loam_core::remote::{HttpRemoteStore, RemoteStore};
use loam_core::sync::SyncOperation;

use crate::error::CliError;

pub const REMOTE_URL_ENV: &str = "LOAM_REMOTE_URL";
pub const REMOTE_TOKEN_ENV: &str = "LOAM_REMOTE_TOKEN";
pub const USER_ENV: &str = "LOAM_USER";

/// Open the local database and its queue repository
pub async fn open_queue(db_path: &Path) -> Result<(Database, LibSqlQueueRepository), CliError> {
    let db = Database::open(db_path).await?;
    let queue = LibSqlQueueRepository::new(db.connection().clone());
    Ok((db, queue))
}

/// Open the local database and its conflict log
pub async fn open_conflict_log(db_path: &Path) -> Result<(Database, LibSqlConflictLog), CliError> {
    let db = Database::open(db_path).await?;
    let log = LibSqlConflictLog::new(db.connection().clone());
    Ok((db, log))
}

/// Build the remote store from environment configuration, if present
pub fn remote_from_env() -> Result<Option<Arc<dyn RemoteStore>>, CliError> {
    let Ok(url) = std::env::var(REMOTE_URL_ENV) else {
        return Ok(None);
    };
    if url.trim().is_empty() {
        return Ok(None);
    }

    let mut store = HttpRemoteStore::new(url)?;
    if let Ok(token) = std::env::var(REMOTE_TOKEN_ENV) {
        if !token.trim().is_empty() {
            store = store.with_auth_token(token);
        }
    }
    Ok(Some(Arc::new(store)))
}

/// The user id all captured records are scoped to
pub fn current_user() -> String {
    std::env::var(USER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "local".to_string())
}

/// Split capture input into body text and `#tags`
pub fn parse_capture(content: &str) -> (String, Vec<String>) {
    let mut tags = Vec::new();
    for word in content.split_whitespace() {
        if let Some(tag) = word.strip_prefix('#') {
            if !tag.is_empty() && !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    (content.trim().to_string(), tags)
}

/// First line of the content, as a default title
pub fn default_title(content: &str) -> String {
    content.lines().next().unwrap_or("").trim().to_string()
}

/// Human-readable age of a Unix-ms timestamp
pub fn format_relative(timestamp_ms: i64, now_ms: i64) -> String {
    let delta_secs = (now_ms - timestamp_ms).max(0) / 1000;
    if delta_secs < 60 {
        return format!("{delta_secs}s ago");
    }
    let minutes = delta_secs / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}

/// One display line per queued operation
pub fn format_queue_lines(operations: &[SyncOperation]) -> Vec<String> {
    let now = chrono::Utc::now().timestamp_millis();
    operations
        .iter()
        .map(|operation| {
            let retries = if operation.retry_count > 0 {
                format!(" (retries: {})", operation.retry_count)
            } else {
                String::new()
            };
            format!(
                "{}  {} {} {}  {}{}",
                operation.id,
                operation.payload.operation_kind(),
                operation.payload.entity_kind(),
                operation.payload.entity_id(),
                format_relative(operation.enqueued_at, now),
                retries
            )
        })
        .collect()
}
