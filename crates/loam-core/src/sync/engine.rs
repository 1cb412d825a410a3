//! Sync engine
//!
//! Drains the durable queue against the remote store. Invoked on reconnect,
//! on demand, and after enqueuing while online; re-entrant invocations are
//! no-ops while a drain is in flight. Operations apply sequentially in FIFO
//! order; a failing operation never blocks the rest of the pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::db::QueueRepository;
use crate::error::Result;
use crate::models::RemoteEntity;
use crate::remote::{RemoteError, RemoteStore};

use super::marker::LocalChangeTracker;
use super::network::NetworkStatus;
use super::operation::OperationPayload;

/// Attempts before an operation is dropped and counted as failed
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Monotonically increasing retry delays, indexed by retry count and clamped
/// at the last entry
const BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(60),
    Duration::from_secs(300),
];

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Advisory progress events for observability surfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started { pending: usize },
    Progress { completed: usize, pending: usize },
    Completed { synced: usize, failed: usize },
    Error { message: String },
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations applied and removed from the queue
    pub synced: usize,
    /// Operations that failed this pass and remain queued
    pub failed: usize,
    /// Operations dropped after exhausting their retries
    pub dropped: usize,
}

/// Drains the durable queue against the remote store.
///
/// Cheap to clone; all state is shared. Construct one per user session and
/// tear it down with [`SyncEngine::shutdown`].
#[derive(Clone)]
pub struct SyncEngine {
    queue: Arc<dyn QueueRepository>,
    remote: Arc<dyn RemoteStore>,
    tracker: Arc<LocalChangeTracker>,
    status: watch::Receiver<NetworkStatus>,
    events: broadcast::Sender<SyncEvent>,
    is_syncing: Arc<AtomicBool>,
    retry_pending: Arc<AtomicBool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    max_retries: u32,
}

impl SyncEngine {
    /// Build an engine over its injected collaborators
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        remote: Arc<dyn RemoteStore>,
        tracker: Arc<LocalChangeTracker>,
        status: watch::Receiver<NetworkStatus>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queue,
            remote,
            tracker,
            status,
            events,
            is_syncing: Arc::new(AtomicBool::new(false)),
            retry_pending: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the retry bound
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Subscribe to advisory progress events
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Whether a drain is currently in flight
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    /// Enqueue a mutation, then drain opportunistically when online.
    ///
    /// The enqueue itself never touches the network; drain failures are
    /// reported through events, not through this call.
    pub async fn submit(&self, payload: OperationPayload) -> Result<super::SyncOperation> {
        let operation = self.queue.enqueue(payload).await?;
        tracing::debug!(
            operation = %operation.id,
            entity = %operation.payload.entity_id(),
            "Enqueued {} for {}",
            operation.payload.operation_kind(),
            operation.payload.entity_kind()
        );

        if self.status.borrow().is_online {
            if let Err(error) = self.process_queue().await {
                tracing::error!("Drain after enqueue failed: {error}");
            }
        }
        Ok(operation)
    }

    /// Drain all queued operations against the remote store.
    ///
    /// Returns an empty report immediately when a drain is already running.
    /// Local-store failures abort the pass and propagate.
    pub async fn process_queue(&self) -> Result<SyncReport> {
        if self.is_syncing.swap(true, Ordering::SeqCst) {
            tracing::debug!("Sync already in progress, skipping");
            return Ok(SyncReport::default());
        }

        let result = self.drain().await;
        self.is_syncing.store(false, Ordering::SeqCst);

        if let Err(error) = &result {
            let _ = self.events.send(SyncEvent::Error {
                message: error.to_string(),
            });
        }
        result
    }

    async fn drain(&self) -> Result<SyncReport> {
        let operations = self.queue.dequeue_all().await?;
        let pending = operations.len();
        let _ = self.events.send(SyncEvent::Started { pending });

        let mut report = SyncReport::default();
        let mut completed = 0usize;
        let mut next_delay: Option<Duration> = None;

        for operation in operations {
            if operation.retry_count >= self.max_retries {
                tracing::warn!(
                    operation = %operation.id,
                    entity = %operation.payload.entity_id(),
                    "Dropping operation after {} failed attempts",
                    operation.retry_count
                );
                self.queue.remove(&operation.id).await?;
                report.dropped += 1;
                continue;
            }

            match self.apply(&operation.payload).await {
                Ok(()) => {
                    self.queue.remove(&operation.id).await?;
                    report.synced += 1;
                    completed += 1;
                    let _ = self.events.send(SyncEvent::Progress { completed, pending });
                }
                Err(error) => {
                    tracing::warn!(
                        operation = %operation.id,
                        entity = %operation.payload.entity_id(),
                        "Apply failed: {error}"
                    );
                    self.queue
                        .increment_retry(&operation.id, &error.to_string())
                        .await?;
                    report.failed += 1;

                    let delay = backoff_delay(operation.retry_count);
                    next_delay = Some(next_delay.map_or(delay, |d| d.min(delay)));
                }
            }
        }

        let _ = self.events.send(SyncEvent::Completed {
            synced: report.synced,
            failed: report.failed + report.dropped,
        });

        if let Some(delay) = next_delay {
            self.schedule_retry(delay);
        }
        Ok(report)
    }

    /// Apply one mutation against the remote store.
    ///
    /// The entity is marked locally before the write so the realtime echo of
    /// our own change is recognized as such.
    async fn apply(&self, payload: &OperationPayload) -> std::result::Result<(), RemoteError> {
        self.tracker
            .track(payload.entity_kind(), &payload.entity_id(), payload.record());

        match payload {
            OperationPayload::CreateConversation(c) => {
                self.remote
                    .insert(&RemoteEntity::Conversation(c.clone()))
                    .await
            }
            OperationPayload::UpdateConversation(c) => {
                self.remote
                    .update(&RemoteEntity::Conversation(c.clone()))
                    .await
            }
            OperationPayload::DeleteConversation(id) => {
                self.remote
                    .delete(payload.entity_kind(), &id.to_string())
                    .await
            }
            OperationPayload::CreateKnowledgeItem(k) => {
                self.remote
                    .insert(&RemoteEntity::KnowledgeItem(k.clone()))
                    .await
            }
            OperationPayload::UpdateKnowledgeItem(k) => {
                self.remote
                    .update(&RemoteEntity::KnowledgeItem(k.clone()))
                    .await
            }
            OperationPayload::DeleteKnowledgeItem(id) => {
                self.remote
                    .delete(payload.entity_kind(), &id.to_string())
                    .await
            }
        }
    }

    /// Schedule a future drain after a failure.
    ///
    /// At most one retry timer is pending at a time; a retry that wakes to an
    /// empty queue stops without rescheduling.
    fn schedule_retry(&self, delay: Duration) {
        if self.retry_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!("Scheduling sync retry in {delay:?}");
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.retry_pending.store(false, Ordering::SeqCst);

            match engine.queue.pending_count().await {
                Ok(0) => {}
                Ok(_) => {
                    if let Err(error) = engine.process_queue().await {
                        tracing::error!("Retry drain failed: {error}");
                    }
                }
                Err(error) => tracing::error!("Retry could not read queue: {error}"),
            }
        });
        self.push_task(handle);
    }

    /// Spawn the reconnect listener: one drain per offline→online transition
    pub fn start(&self) {
        let engine = self.clone();
        let mut status = self.status.clone();
        let handle = tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let snapshot = *status.borrow_and_update();
                if snapshot.reconnected() {
                    tracing::info!("Connectivity regained, draining sync queue");
                    if let Err(error) = engine.process_queue().await {
                        tracing::error!("Drain after reconnect failed: {error}");
                    }
                }
            }
        });
        self.push_task(handle);
    }

    /// Abort the reconnect listener and any pending retry timers
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.retry_pending.store(false, Ordering::SeqCst);
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            // Opportunistically reap finished tasks so the vec stays bounded
            tasks.retain(|task| !task.is_finished());
            tasks.push(handle);
        }
    }
}

/// Delay before the next attempt, indexed by the current retry count
fn backoff_delay(retry_count: u32) -> Duration {
    let index = (retry_count as usize).min(BACKOFF_SCHEDULE.len() - 1);
    BACKOFF_SCHEDULE[index]
}
