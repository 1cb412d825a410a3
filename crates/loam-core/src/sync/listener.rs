//! Realtime change listener
//!
//! Subscribes to remote change notifications for both collections, scoped to
//! the current user, and feeds the conflict detector. Notifications that are
//! echoes of this device's own writes are suppressed; remote changes with no
//! local interest are accepted silently.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::models::{EntityKind, RemoteEntity};
use crate::remote::{ChangeEvent, ChangeFeed, ChangeKind, RemoteError};

use super::conflict::{Conflict, ConflictDetector, ConflictKind};
use super::marker::LocalChangeTracker;

/// Consumes remote change notifications and raises conflicts
pub struct ChangeListener {
    detector: Arc<ConflictDetector>,
    tracker: Arc<LocalChangeTracker>,
    user_id: String,
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeListener {
    /// Build a listener for the given user session
    #[must_use]
    pub fn new(
        detector: Arc<ConflictDetector>,
        tracker: Arc<LocalChangeTracker>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            tracker,
            user_id: user_id.into(),
            tasks: Vec::new(),
        }
    }

    /// Subscribe to both collections and start consuming notifications.
    ///
    /// Idempotent per call site: calling again adds fresh subscriptions, so
    /// callers should `stop` first when restarting.
    pub async fn start(&mut self, feed: &dyn ChangeFeed) -> Result<(), RemoteError> {
        for kind in [EntityKind::Conversation, EntityKind::KnowledgeItem] {
            let mut subscription = feed.subscribe(kind, &self.user_id).await?;
            let detector = self.detector.clone();
            let tracker = self.tracker.clone();
            let user_id = self.user_id.clone();

            let handle = tokio::spawn(async move {
                while let Some(event) = subscription.next_event().await {
                    handle_event(&detector, &tracker, &user_id, &event);
                }
                tracing::debug!("Change feed for {kind} closed");
            });
            self.tasks.push(handle);
        }
        Ok(())
    }

    /// Stop consuming and drop the subscriptions
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Process one remote change notification
fn handle_event(
    detector: &ConflictDetector,
    tracker: &LocalChangeTracker,
    user_id: &str,
    event: &ChangeEvent,
) {
    let Some(item_id) = event.entity_id() else {
        return;
    };

    // Our own write echoing back through the feed
    if tracker.is_echo(event.entity_kind, &item_id) {
        tracing::debug!(item = %item_id, "Suppressed echo of local write");
        return;
    }

    if event.user_id() != Some(user_id) {
        return;
    }

    // Conflicts are only interesting when this device also changed the entity
    if matches!(event.change, ChangeKind::Insert)
        || !tracker.has_interest(event.entity_kind, &item_id)
    {
        return;
    }

    let expected = tracker.expected(event.entity_kind, &item_id);
    let conflict = match event.change {
        ChangeKind::Update => {
            let Some(actual) = event.new_record.clone() else {
                return;
            };
            let Some(expected_record) = expected else {
                // Marker without a snapshot: nothing to compare against
                return;
            };
            if !detector.has_conflict(&expected_record, &actual) {
                return;
            }
            Conflict {
                kind: ConflictKind::classify(&expected_record, &actual),
                entity_kind: event.entity_kind,
                item_id,
                item_title: actual.title().map(ToString::to_string),
                expected: Some(expected_record),
                actual: Some(actual),
                detected_at: chrono::Utc::now().timestamp_millis(),
            }
        }
        ChangeKind::Delete => Conflict {
            kind: ConflictKind::Delete,
            entity_kind: event.entity_kind,
            item_title: expected
                .as_ref()
                .and_then(|record| record.title().map(ToString::to_string)),
            item_id,
            expected,
            actual: None,
            detected_at: chrono::Utc::now().timestamp_millis(),
        },
        ChangeKind::Insert => return,
    };

    detector.record(conflict);
}
