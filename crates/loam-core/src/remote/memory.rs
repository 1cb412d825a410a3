//! In-process remote store
//!
//! Backs tests and the CLI's offline demo mode with the full [`RemoteStore`]
//! plus [`ChangeFeed`] contract. Mutations fan out over a broadcast channel so
//! subscribers observe the same insert/update/delete notifications a hosted
//! backend would deliver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::models::{EntityKind, RemoteEntity};

use super::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, RemoteError, RemoteStore,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-memory implementation of the remote store contract
#[derive(Clone)]
pub struct InMemoryRemoteStore {
    records: Arc<RwLock<HashMap<(EntityKind, String), RemoteEntity>>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Number of stored records across both collections
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Overwrite a record without emitting a change notification.
    ///
    /// Seeds server-side state in tests: the notification suppression makes it
    /// possible to distinguish "already there" from "changed while watching".
    pub async fn seed(&self, record: RemoteEntity) {
        let key = (record.kind(), record.entity_id());
        self.records.write().await.insert(key, record);
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine; notifications are advisory.
        let _ = self.changes.send(event);
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn insert(&self, record: &RemoteEntity) -> Result<(), RemoteError> {
        let key = (record.kind(), record.entity_id());
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(RemoteError::Rejected(format!(
                "duplicate id in {}: {}",
                key.0, key.1
            )));
        }
        records.insert(key, record.clone());
        drop(records);

        self.publish(ChangeEvent {
            entity_kind: record.kind(),
            change: ChangeKind::Insert,
            new_record: Some(record.clone()),
            old_record: None,
        });
        Ok(())
    }

    async fn update(&self, record: &RemoteEntity) -> Result<(), RemoteError> {
        let key = (record.kind(), record.entity_id());
        let mut records = self.records.write().await;
        let Some(previous) = records.get(&key).cloned() else {
            return Err(RemoteError::NotFound {
                collection: record.kind().collection(),
                id: record.entity_id(),
            });
        };
        records.insert(key, record.clone());
        drop(records);

        self.publish(ChangeEvent {
            entity_kind: record.kind(),
            change: ChangeKind::Update,
            new_record: Some(record.clone()),
            old_record: Some(previous),
        });
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        let removed = self
            .records
            .write()
            .await
            .remove(&(kind, id.to_string()));

        if let Some(previous) = removed {
            self.publish(ChangeEvent {
                entity_kind: kind,
                change: ChangeKind::Delete,
                new_record: None,
                old_record: Some(previous),
            });
        }
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> Result<Option<RemoteEntity>, RemoteError> {
        Ok(self
            .records
            .read()
            .await
            .get(&(kind, id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryRemoteStore {
    async fn subscribe(
        &self,
        kind: EntityKind,
        user_id: &str,
    ) -> Result<ChangeSubscription, RemoteError> {
        let mut source = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let user_id = user_id.to_string();

        let forwarder = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if event.entity_kind != kind || event.user_id() != Some(user_id.as_str()) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Change feed lagged, {skipped} notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(ChangeSubscription::new(rx, forwarder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KnowledgeItem;

    fn item(user: &str) -> RemoteEntity {
        RemoteEntity::KnowledgeItem(KnowledgeItem::new(user, "Title", "Body", Vec::new()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_then_fetch() {
        let store = InMemoryRemoteStore::new();
        let record = item("user-1");
        let id = record.entity_id();

        store.insert(&record).await.unwrap();
        let fetched = store
            .fetch(EntityKind::KnowledgeItem, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryRemoteStore::new();
        let record = item("user-1");

        store.insert(&record).await.unwrap();
        let error = store.insert(&record).await.unwrap_err();
        assert!(!error.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_missing_record_is_not_found() {
        let store = InMemoryRemoteStore::new();
        let error = store.update(&item("user-1")).await.unwrap_err();
        assert!(matches!(error, RemoteError::NotFound { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_missing_record_is_noop() {
        let store = InMemoryRemoteStore::new();
        store
            .delete(EntityKind::KnowledgeItem, "absent")
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_inserts_then_updates() {
        let store = InMemoryRemoteStore::new();
        let record = item("user-1");

        store.upsert(&record).await.unwrap();
        store.upsert(&record).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscription_filters_by_user() {
        let store = InMemoryRemoteStore::new();
        let mut subscription = store
            .subscribe(EntityKind::KnowledgeItem, "user-1")
            .await
            .unwrap();

        store.insert(&item("user-2")).await.unwrap();
        let mine = item("user-1");
        store.insert(&mine).await.unwrap();

        let event = subscription.next_event().await.unwrap();
        assert_eq!(event.user_id(), Some("user-1"));
        assert_eq!(event.entity_id(), Some(mine.entity_id()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn seed_does_not_notify() {
        let store = InMemoryRemoteStore::new();
        let mut subscription = store
            .subscribe(EntityKind::KnowledgeItem, "user-1")
            .await
            .unwrap();

        store.seed(item("user-1")).await;
        let noisy = item("user-1");
        store.insert(&noisy).await.unwrap();

        let event = subscription.next_event().await.unwrap();
        assert_eq!(event.entity_id(), Some(noisy.entity_id()));
    }
}
