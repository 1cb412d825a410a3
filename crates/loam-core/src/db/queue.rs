//! Durable local queue of pending sync operations

use async_trait::async_trait;
use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::sync::{OperationId, OperationPayload, SyncOperation};

/// Trait for durable queue storage operations
///
/// The queue is the write-ahead log of local mutations. It is owned by the
/// syncing subsystem; nothing else mutates its rows directly.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Append a mutation with `retry_count = 0`; local write only
    async fn enqueue(&self, payload: OperationPayload) -> Result<SyncOperation>;

    /// All pending operations in enqueue (FIFO) order; does not remove them
    async fn dequeue_all(&self) -> Result<Vec<SyncOperation>>;

    /// Remove an operation after successful remote application; idempotent
    async fn remove(&self, id: &OperationId) -> Result<()>;

    /// Record a failed apply attempt
    async fn increment_retry(&self, id: &OperationId, error: &str) -> Result<()>;

    /// Number of operations waiting to be applied
    async fn pending_count(&self) -> Result<usize>;

    /// Remove all operations (full data reset, not normal operation)
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository {
    conn: Connection,
}

impl LibSqlQueueRepository {
    /// Create a new repository over the given connection
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn parse_operation(row: &libsql::Row) -> Result<SyncOperation> {
        let id: String = row.get(0)?;
        let payload: String = row.get(1)?;
        let enqueued_at: i64 = row.get(2)?;
        let retry_count: i64 = row.get(3)?;
        let last_error = match row.get_value(4)? {
            libsql::Value::Text(text) => Some(text),
            _ => None,
        };

        Ok(SyncOperation {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid operation id: {id}")))?,
            payload: serde_json::from_str(&payload)?,
            enqueued_at,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_error,
        })
    }
}

#[async_trait]
impl QueueRepository for LibSqlQueueRepository {
    async fn enqueue(&self, payload: OperationPayload) -> Result<SyncOperation> {
        let operation = SyncOperation::new(payload);
        let payload_json = serde_json::to_string(&operation.payload)?;

        self.conn
            .execute(
                "INSERT INTO sync_queue
                 (id, entity_kind, operation, entity_id, payload, enqueued_at, retry_count)
                 VALUES (?, ?, ?, ?, ?, ?, 0)",
                params![
                    operation.id.to_string(),
                    operation.payload.entity_kind().collection(),
                    operation.payload.operation_kind().as_str(),
                    operation.payload.entity_id(),
                    payload_json,
                    operation.enqueued_at,
                ],
            )
            .await?;

        Ok(operation)
    }

    async fn dequeue_all(&self) -> Result<Vec<SyncOperation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, payload, enqueued_at, retry_count, last_error
                 FROM sync_queue
                 ORDER BY seq ASC",
                (),
            )
            .await?;

        let mut operations = Vec::new();
        while let Some(row) = rows.next().await? {
            operations.push(Self::parse_operation(&row)?);
        }
        Ok(operations)
    }

    async fn remove(&self, id: &OperationId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_queue WHERE id = ?",
                params![id.to_string()],
            )
            .await?;
        Ok(())
    }

    async fn increment_retry(&self, id: &OperationId, error: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue SET retry_count = retry_count + 1, last_error = ? WHERE id = ?",
                params![error, id.to_string()],
            )
            .await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sync_queue", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Conversation, KnowledgeItem};
    use pretty_assertions::assert_eq;

    async fn setup() -> (Database, LibSqlQueueRepository) {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQueueRepository::new(db.connection().clone());
        (db, repo)
    }

    fn create_item_payload() -> OperationPayload {
        OperationPayload::CreateKnowledgeItem(KnowledgeItem::new(
            "user-1",
            "Title",
            "Body",
            vec!["tag".to_string()],
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_preserves_fifo_order() {
        let (_db, repo) = setup().await;

        let first = repo.enqueue(create_item_payload()).await.unwrap();
        let second = repo
            .enqueue(OperationPayload::CreateConversation(Conversation::new(
                "user-1", "Ideas",
            )))
            .await
            .unwrap();
        let third = repo.enqueue(create_item_payload()).await.unwrap();

        let pending = repo.dequeue_all().await.unwrap();
        assert_eq!(
            pending.iter().map(|op| op.id).collect::<Vec<_>>(),
            vec![first.id, second.id, third.id]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dequeue_all_does_not_remove() {
        let (_db, repo) = setup().await;
        repo.enqueue(create_item_payload()).await.unwrap();

        repo.dequeue_all().await.unwrap();
        assert_eq!(repo.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_is_idempotent() {
        let (_db, repo) = setup().await;
        let operation = repo.enqueue(create_item_payload()).await.unwrap();

        repo.remove(&operation.id).await.unwrap();
        repo.remove(&operation.id).await.unwrap();
        repo.remove(&OperationId::new()).await.unwrap();

        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn increment_retry_records_error() {
        let (_db, repo) = setup().await;
        let operation = repo.enqueue(create_item_payload()).await.unwrap();

        repo.increment_retry(&operation.id, "connection refused")
            .await
            .unwrap();
        repo.increment_retry(&operation.id, "timed out")
            .await
            .unwrap();

        let pending = repo.dequeue_all().await.unwrap();
        assert_eq!(pending[0].retry_count, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("timed out"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_empties_the_queue() {
        let (_db, repo) = setup().await;
        repo.enqueue(create_item_payload()).await.unwrap();
        repo.enqueue(create_item_payload()).await.unwrap();

        repo.clear().await.unwrap();
        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("loam.db");

        let enqueued = {
            let db = Database::open(&path).await.unwrap();
            let repo = LibSqlQueueRepository::new(db.connection().clone());
            repo.enqueue(create_item_payload()).await.unwrap()
        };

        let db = Database::open(&path).await.unwrap();
        let repo = LibSqlQueueRepository::new(db.connection().clone());
        let pending = repo.dequeue_all().await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, enqueued.id);
        assert_eq!(pending[0].payload, enqueued.payload);
    }
}
