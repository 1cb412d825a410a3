//! Durable log of resolved sync conflicts

use async_trait::async_trait;
use libsql::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::EntityKind;

/// A conflict that was resolved, recorded for audit and the CLI surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Log row identifier
    pub id: i64,
    /// Entity involved in the conflict
    pub item_id: String,
    /// Collection the entity belongs to
    pub entity_kind: EntityKind,
    /// Local side's timestamp when the conflict was resolved
    pub local_updated_at: i64,
    /// Remote side's timestamp when the conflict was resolved
    pub remote_updated_at: i64,
    /// Resolution timestamp (Unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}

/// Trait for conflict log storage
#[async_trait]
pub trait ConflictLog: Send + Sync {
    /// Append a resolved conflict to the log
    async fn append(
        &self,
        item_id: &str,
        entity_kind: EntityKind,
        local_updated_at: i64,
        remote_updated_at: i64,
        strategy: &str,
    ) -> Result<()>;

    /// Most recently resolved conflicts, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<ConflictRecord>>;
}

/// libSQL implementation of `ConflictLog`
pub struct LibSqlConflictLog {
    conn: Connection,
}

impl LibSqlConflictLog {
    /// Create a new log over the given connection
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ConflictLog for LibSqlConflictLog {
    async fn append(
        &self,
        item_id: &str,
        entity_kind: EntityKind,
        local_updated_at: i64,
        remote_updated_at: i64,
        strategy: &str,
    ) -> Result<()> {
        let resolved_at = chrono::Utc::now().timestamp_millis();
        self.conn
            .execute(
                "INSERT INTO conflict_log
                 (item_id, entity_kind, local_updated_at, remote_updated_at, resolved_at, strategy)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    item_id,
                    entity_kind.collection(),
                    local_updated_at,
                    remote_updated_at,
                    resolved_at,
                    strategy,
                ],
            )
            .await?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
    async fn list_recent(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, item_id, entity_kind, local_updated_at, remote_updated_at,
                        resolved_at, strategy
                 FROM conflict_log
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let entity_kind: String = row.get(2)?;
            records.push(ConflictRecord {
                id: row.get(0)?,
                item_id: row.get(1)?,
                entity_kind: entity_kind.parse()?,
                local_updated_at: row.get(3)?,
                remote_updated_at: row.get(4)?,
                resolved_at: row.get(5)?,
                strategy: row.get(6)?,
            });
        }
        Ok(records)
    }
}
