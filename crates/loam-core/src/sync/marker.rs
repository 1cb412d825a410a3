//! Local change markers
//!
//! Every local write is marked here before it reaches the remote store. When
//! the write echoes back through the realtime feed within the suppression
//! window it is recognized as our own and ignored; after the window expires
//! the marker still identifies entities with local interest so the conflict
//! detector knows which remote changes matter. The map itself is bounded by a
//! longer retention sweep.
//!
//! The suppression window is a best-effort heuristic: an echo delayed past it
//! will be treated as an external change.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{EntityKind, RemoteEntity};

/// Echo suppression window (seconds-scale by design)
const DEFAULT_SUPPRESSION_WINDOW_MS: i64 = 10_000;
/// How long markers are kept for conflict cross-referencing
const DEFAULT_RETENTION_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone)]
struct MarkerEntry {
    marked_at: i64,
    expected: Option<RemoteEntity>,
}

/// In-memory record of entities the local device just modified
pub struct LocalChangeTracker {
    suppression_window_ms: i64,
    retention_ms: i64,
    entries: Mutex<HashMap<(EntityKind, String), MarkerEntry>>,
}

impl LocalChangeTracker {
    /// Create a tracker with the default windows (10 s suppression, 5 min
    /// retention)
    #[must_use]
    pub fn new() -> Self {
        Self::with_windows(DEFAULT_SUPPRESSION_WINDOW_MS, DEFAULT_RETENTION_MS)
    }

    /// Create a tracker with explicit windows (milliseconds)
    #[must_use]
    pub fn with_windows(suppression_window_ms: i64, retention_ms: i64) -> Self {
        Self {
            suppression_window_ms,
            retention_ms: retention_ms.max(suppression_window_ms),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Mark an entity as just modified locally, with the version the device
    /// believes is current
    pub fn track(&self, kind: EntityKind, entity_id: &str, expected: Option<RemoteEntity>) {
        self.track_at(
            kind,
            entity_id,
            expected,
            chrono::Utc::now().timestamp_millis(),
        );
    }

    fn track_at(
        &self,
        kind: EntityKind,
        entity_id: &str,
        expected: Option<RemoteEntity>,
        now: i64,
    ) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.retain(|_, entry| now - entry.marked_at <= self.retention_ms);
        entries.insert(
            (kind, entity_id.to_string()),
            MarkerEntry {
                marked_at: now,
                expected,
            },
        );
    }

    /// Whether a notification for this entity is the device's own write
    /// echoing back
    #[must_use]
    pub fn is_echo(&self, kind: EntityKind, entity_id: &str) -> bool {
        self.is_echo_at(kind, entity_id, chrono::Utc::now().timestamp_millis())
    }

    fn is_echo_at(&self, kind: EntityKind, entity_id: &str, now: i64) -> bool {
        // Strict comparison so a zero window disables suppression entirely
        self.entries
            .lock()
            .ok()
            .and_then(|entries| {
                entries
                    .get(&(kind, entity_id.to_string()))
                    .map(|entry| now - entry.marked_at < self.suppression_window_ms)
            })
            .unwrap_or(false)
    }

    /// Whether the local device has a pending/recent change to this entity
    #[must_use]
    pub fn has_interest(&self, kind: EntityKind, entity_id: &str) -> bool {
        self.entries
            .lock()
            .is_ok_and(|entries| entries.contains_key(&(kind, entity_id.to_string())))
    }

    /// The version the device believed current when it last modified the
    /// entity
    #[must_use]
    pub fn expected(&self, kind: EntityKind, entity_id: &str) -> Option<RemoteEntity> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| {
                entries
                    .get(&(kind, entity_id.to_string()))
                    .and_then(|entry| entry.expected.clone())
            })
    }

    /// Forget a marker (e.g., after its conflict was resolved)
    pub fn forget(&self, kind: EntityKind, entity_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&(kind, entity_id.to_string()));
        }
    }

    /// Drop every marker older than the retention window
    pub fn prune(&self) {
        let now = chrono::Utc::now().timestamp_millis();
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, entry| now - entry.marked_at <= self.retention_ms);
        }
    }
}

impl Default for LocalChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KnowledgeItem;

    fn snapshot() -> RemoteEntity {
        RemoteEntity::KnowledgeItem(KnowledgeItem::new("user-1", "Title", "Body", Vec::new()))
    }

    #[test]
    fn fresh_marker_is_an_echo() {
        let tracker = LocalChangeTracker::new();
        tracker.track(EntityKind::KnowledgeItem, "item-1", Some(snapshot()));

        assert!(tracker.is_echo(EntityKind::KnowledgeItem, "item-1"));
        assert!(tracker.has_interest(EntityKind::KnowledgeItem, "item-1"));
    }

    #[test]
    fn echo_expires_but_interest_remains() {
        let tracker = LocalChangeTracker::with_windows(10_000, 300_000);
        let now = chrono::Utc::now().timestamp_millis();
        tracker.track_at(EntityKind::KnowledgeItem, "item-1", Some(snapshot()), now);

        // 30 s later: past suppression, inside retention
        assert!(!tracker.is_echo_at(EntityKind::KnowledgeItem, "item-1", now + 30_000));
        assert!(tracker.has_interest(EntityKind::KnowledgeItem, "item-1"));
        assert!(tracker
            .expected(EntityKind::KnowledgeItem, "item-1")
            .is_some());
    }

    #[test]
    fn untracked_entity_is_not_an_echo() {
        let tracker = LocalChangeTracker::new();
        assert!(!tracker.is_echo(EntityKind::Conversation, "absent"));
        assert!(!tracker.has_interest(EntityKind::Conversation, "absent"));
    }

    #[test]
    fn retention_sweep_drops_stale_entries() {
        let tracker = LocalChangeTracker::with_windows(10_000, 300_000);
        let now = chrono::Utc::now().timestamp_millis();
        tracker.track_at(EntityKind::KnowledgeItem, "stale", None, now - 400_000);

        // Any new track sweeps entries past retention
        tracker.track_at(EntityKind::KnowledgeItem, "fresh", None, now);
        assert!(!tracker.has_interest(EntityKind::KnowledgeItem, "stale"));
        assert!(tracker.has_interest(EntityKind::KnowledgeItem, "fresh"));
    }

    #[test]
    fn forget_removes_marker() {
        let tracker = LocalChangeTracker::new();
        tracker.track(EntityKind::KnowledgeItem, "item-1", None);
        tracker.forget(EntityKind::KnowledgeItem, "item-1");
        assert!(!tracker.has_interest(EntityKind::KnowledgeItem, "item-1"));
    }

    #[test]
    fn kinds_do_not_collide() {
        let tracker = LocalChangeTracker::new();
        tracker.track(EntityKind::KnowledgeItem, "shared-id", None);
        assert!(!tracker.has_interest(EntityKind::Conversation, "shared-id"));
    }
}
