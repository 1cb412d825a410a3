//! Remote store contract
//!
//! The hosted backend is an opaque CRUD-over-network store. The sync engine
//! and conflict resolver only ever talk to it through [`RemoteStore`], and the
//! realtime listener consumes change notifications through [`ChangeFeed`].

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::InMemoryRemoteStore;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{EntityKind, RemoteEntity};

/// Errors surfaced by a remote store implementation
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transient failure: connectivity loss, 5xx-equivalent, overload
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Request exceeded the configured timeout
    #[error("Remote request timed out")]
    Timeout,

    /// Permanent failure: validation error, constraint violation
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),

    /// The referenced record does not exist remotely
    #[error("Record not found in {collection}: {id}")]
    NotFound {
        collection: &'static str,
        id: String,
    },
}

impl RemoteError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// The sync engine currently retries uniformly regardless; this exists so
    /// callers can classify failures without string-matching messages.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// CRUD contract against the remote backend, keyed by collection + id
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert a new record; fails with `Rejected` when the id already exists
    async fn insert(&self, record: &RemoteEntity) -> Result<(), RemoteError>;

    /// Replace an existing record; fails with `NotFound` when absent
    async fn update(&self, record: &RemoteEntity) -> Result<(), RemoteError>;

    /// Delete a record by id; deleting an absent record is a no-op
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError>;

    /// Fetch a record by id, `None` when absent
    async fn fetch(&self, kind: EntityKind, id: &str) -> Result<Option<RemoteEntity>, RemoteError>;

    /// Update the record, inserting it when it does not exist yet
    async fn upsert(&self, record: &RemoteEntity) -> Result<(), RemoteError> {
        match self.update(record).await {
            Err(RemoteError::NotFound { .. }) => self.insert(record).await,
            other => other,
        }
    }
}

/// What happened to a remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change notification delivered by the remote backend
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub entity_kind: EntityKind,
    pub change: ChangeKind,
    /// Record state after the change (`None` for deletes)
    pub new_record: Option<RemoteEntity>,
    /// Record state before the change (`None` for inserts)
    pub old_record: Option<RemoteEntity>,
}

impl ChangeEvent {
    /// Resolve the affected entity id from the new or old record
    #[must_use]
    pub fn entity_id(&self) -> Option<String> {
        self.new_record
            .as_ref()
            .or(self.old_record.as_ref())
            .map(RemoteEntity::entity_id)
    }

    /// Owner of the affected record, from the new or old side
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.new_record
            .as_ref()
            .or(self.old_record.as_ref())
            .map(RemoteEntity::user_id)
    }
}

/// Source of change notifications for one collection, scoped to one user
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(
        &self,
        kind: EntityKind,
        user_id: &str,
    ) -> Result<ChangeSubscription, RemoteError>;
}

/// An active change subscription.
///
/// Dropping the subscription tears it down; the backing forwarder task is
/// aborted so no notification can reach a torn-down consumer.
pub struct ChangeSubscription {
    receiver: mpsc::Receiver<ChangeEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl ChangeSubscription {
    /// Wrap a receiver and the forwarder task feeding it
    #[must_use]
    pub const fn new(receiver: mpsc::Receiver<ChangeEvent>, forwarder: JoinHandle<()>) -> Self {
        Self {
            receiver,
            forwarder: Some(forwarder),
        }
    }

    /// Wait for the next change notification; `None` once the feed closes
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}
