//! Conflict detection
//!
//! A conflict is a materialized disagreement between the version of an entity
//! the local device believed current and the version the remote store now
//! holds. Detection is timestamp-based with a configurable tolerance that
//! absorbs clock and serialization jitter.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::models::{EntityKind, RemoteEntity};
use crate::remote::{RemoteError, RemoteStore};

/// Divergence tolerance for `updated_at` comparison
const DEFAULT_TOLERANCE_MS: i64 = 1_000;
/// Window within which repeat conflicts for the same entity are collapsed
const DEFAULT_DEDUP_WINDOW_MS: i64 = 60_000;

/// Classification of a detected conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Both sides changed record content
    Update,
    /// Local change against a remotely deleted record
    Delete,
    /// Only the tag set differs
    Tag,
    /// Same messages, different order
    Reorder,
}

impl ConflictKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Tag => "tag",
            Self::Reorder => "reorder",
        }
    }

    /// Classify an update conflict by what actually differs between the two
    /// versions
    #[must_use]
    pub fn classify(expected: &RemoteEntity, actual: &RemoteEntity) -> Self {
        match (expected, actual) {
            (RemoteEntity::KnowledgeItem(e), RemoteEntity::KnowledgeItem(a)) => {
                if e.title == a.title && e.content == a.content && e.tags != a.tags {
                    Self::Tag
                } else {
                    Self::Update
                }
            }
            (RemoteEntity::Conversation(e), RemoteEntity::Conversation(a)) => {
                let expected_ids: Vec<_> = e.messages.iter().map(|m| m.id).collect();
                let actual_ids: Vec<_> = a.messages.iter().map(|m| m.id).collect();
                let mut expected_sorted = expected_ids.clone();
                let mut actual_sorted = actual_ids.clone();
                expected_sorted.sort_unstable_by_key(ToString::to_string);
                actual_sorted.sort_unstable_by_key(ToString::to_string);

                if expected_ids != actual_ids && expected_sorted == actual_sorted {
                    Self::Reorder
                } else {
                    Self::Update
                }
            }
            _ => Self::Update,
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected, unresolved divergence between two versions of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub entity_kind: EntityKind,
    pub item_id: String,
    pub item_title: Option<String>,
    /// The version the local device believed was current
    pub expected: Option<RemoteEntity>,
    /// The version now present remotely (`None` for delete conflicts)
    pub actual: Option<RemoteEntity>,
    /// When the divergence was detected (Unix ms)
    pub detected_at: i64,
}

/// Flags divergent entity versions and holds the pending conflict set
pub struct ConflictDetector {
    tolerance_ms: i64,
    dedup_window_ms: i64,
    recent: Mutex<HashMap<(String, ConflictKind), i64>>,
    pending: Mutex<Vec<Conflict>>,
}

impl ConflictDetector {
    /// Create a detector with the default tolerance (1 s) and dedup window
    /// (60 s)
    #[must_use]
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_TOLERANCE_MS)
    }

    /// Create a detector with an explicit timestamp tolerance.
    ///
    /// Clock skew tolerance is operational policy, not a domain constant.
    #[must_use]
    pub fn with_tolerance(tolerance_ms: i64) -> Self {
        Self {
            tolerance_ms,
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
            recent: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Override the dedup window
    #[must_use]
    pub const fn with_dedup_window(mut self, dedup_window_ms: i64) -> Self {
        self.dedup_window_ms = dedup_window_ms;
        self
    }

    /// Whether two modification timestamps count as divergent
    #[must_use]
    pub const fn timestamps_diverge(&self, a: i64, b: i64) -> bool {
        (a - b).abs() > self.tolerance_ms
    }

    /// The single divergence primitive: do these two versions conflict?
    #[must_use]
    pub fn has_conflict(&self, local: &RemoteEntity, remote: &RemoteEntity) -> bool {
        self.timestamps_diverge(local.updated_at(), remote.updated_at())
    }

    /// Optimistic-concurrency check: fetch the current remote version and
    /// flag divergence from the expected one. A missing remote record counts
    /// as divergent.
    pub async fn check_version(
        &self,
        store: &dyn RemoteStore,
        kind: EntityKind,
        entity_id: &str,
        expected_updated_at: i64,
    ) -> Result<bool, RemoteError> {
        let current = store.fetch(kind, entity_id).await?;
        Ok(current.map_or(true, |record| {
            self.timestamps_diverge(record.updated_at(), expected_updated_at)
        }))
    }

    /// Add a conflict to the pending set.
    ///
    /// Returns false when an equivalent conflict for the same `(item,
    /// kind)` was already recorded within the dedup window, so rapid change
    /// bursts do not flood the pending set.
    pub fn record(&self, conflict: Conflict) -> bool {
        let key = (conflict.item_id.clone(), conflict.kind);
        let now = conflict.detected_at;

        {
            let Ok(mut recent) = self.recent.lock() else {
                return false;
            };
            recent.retain(|_, seen_at| now - *seen_at <= self.dedup_window_ms);
            if recent.contains_key(&key) {
                return false;
            }
            recent.insert(key, now);
        }

        if let Ok(mut pending) = self.pending.lock() {
            tracing::info!(
                item = %conflict.item_id,
                kind = %conflict.kind,
                "Conflict detected"
            );
            pending.push(conflict);
            return true;
        }
        false
    }

    /// Snapshot of the pending conflict set
    #[must_use]
    pub fn pending(&self) -> Vec<Conflict> {
        self.pending
            .lock()
            .map(|pending| pending.clone())
            .unwrap_or_default()
    }

    /// Remove and return the oldest pending conflict for an item
    #[must_use]
    pub fn take(&self, item_id: &str) -> Option<Conflict> {
        let Ok(mut pending) = self.pending.lock() else {
            return None;
        };
        let index = pending
            .iter()
            .position(|conflict| conflict.item_id == item_id)?;
        Some(pending.remove(index))
    }

    /// Drop all pending conflicts and dedup history
    pub fn clear(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        if let Ok(mut recent) = self.recent.lock() {
            recent.clear();
        }
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Conversation, KnowledgeItem, Message};
    use crate::remote::InMemoryRemoteStore;

    fn item_with_updated_at(updated_at: i64) -> RemoteEntity {
        let mut item = KnowledgeItem::new("user-1", "Title", "Body", Vec::new());
        item.updated_at = updated_at;
        RemoteEntity::KnowledgeItem(item)
    }

    fn conflict_for(item_id: &str, kind: ConflictKind, detected_at: i64) -> Conflict {
        Conflict {
            kind,
            entity_kind: EntityKind::KnowledgeItem,
            item_id: item_id.to_string(),
            item_title: None,
            expected: None,
            actual: None,
            detected_at,
        }
    }

    #[test]
    fn tolerance_absorbs_jitter() {
        let detector = ConflictDetector::new();
        let t = 1_700_000_000_000;

        assert!(!detector.timestamps_diverge(t, t + 500));
        assert!(!detector.timestamps_diverge(t, t + 1_000));
        assert!(detector.timestamps_diverge(t, t + 1_500));
        assert!(detector.timestamps_diverge(t + 1_500, t));
    }

    #[test]
    fn has_conflict_uses_tolerance() {
        let detector = ConflictDetector::new();
        let t = 1_700_000_000_000;

        assert!(!detector.has_conflict(&item_with_updated_at(t), &item_with_updated_at(t + 500)));
        assert!(detector.has_conflict(&item_with_updated_at(t), &item_with_updated_at(t + 1_500)));
    }

    #[test]
    fn custom_tolerance_is_respected() {
        let detector = ConflictDetector::with_tolerance(5_000);
        let t = 1_700_000_000_000;
        assert!(!detector.timestamps_diverge(t, t + 4_000));
        assert!(detector.timestamps_diverge(t, t + 6_000));
    }

    #[test]
    fn dedup_window_collapses_bursts() {
        let detector = ConflictDetector::new();
        let now = chrono::Utc::now().timestamp_millis();

        assert!(detector.record(conflict_for("item-1", ConflictKind::Update, now)));
        assert!(!detector.record(conflict_for("item-1", ConflictKind::Update, now + 10_000)));
        // Different kind for the same item is a distinct conflict
        assert!(detector.record(conflict_for("item-1", ConflictKind::Tag, now + 10_000)));
        // Past the window the same kind may be recorded again
        assert!(detector.record(conflict_for("item-1", ConflictKind::Update, now + 90_000)));

        assert_eq!(detector.pending().len(), 3);
    }

    #[test]
    fn take_removes_pending_conflict() {
        let detector = ConflictDetector::new();
        let now = chrono::Utc::now().timestamp_millis();
        detector.record(conflict_for("item-1", ConflictKind::Update, now));

        let taken = detector.take("item-1").unwrap();
        assert_eq!(taken.item_id, "item-1");
        assert!(detector.take("item-1").is_none());
        assert!(detector.pending().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn check_version_flags_divergence() {
        let detector = ConflictDetector::new();
        let store = InMemoryRemoteStore::new();
        let record = item_with_updated_at(1_700_000_000_000);
        let id = record.entity_id();
        store.seed(record).await;

        let same = detector
            .check_version(&store, EntityKind::KnowledgeItem, &id, 1_700_000_000_500)
            .await
            .unwrap();
        assert!(!same);

        let diverged = detector
            .check_version(&store, EntityKind::KnowledgeItem, &id, 1_700_000_005_000)
            .await
            .unwrap();
        assert!(diverged);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn check_version_treats_missing_as_divergent() {
        let detector = ConflictDetector::new();
        let store = InMemoryRemoteStore::new();

        let diverged = detector
            .check_version(&store, EntityKind::KnowledgeItem, "absent", 0)
            .await
            .unwrap();
        assert!(diverged);
    }

    #[test]
    fn classify_tag_only_difference() {
        let mut expected = KnowledgeItem::new("user-1", "Title", "Body", vec!["a".to_string()]);
        let mut actual = expected.clone();
        actual.tags = vec!["a".to_string(), "b".to_string()];
        expected.updated_at = 1;
        actual.updated_at = 2;

        assert_eq!(
            ConflictKind::classify(
                &RemoteEntity::KnowledgeItem(expected),
                &RemoteEntity::KnowledgeItem(actual)
            ),
            ConflictKind::Tag
        );
    }

    #[test]
    fn classify_content_difference_is_update() {
        let expected = KnowledgeItem::new("user-1", "Title", "Body", Vec::new());
        let mut actual = expected.clone();
        actual.content = "Other".to_string();

        assert_eq!(
            ConflictKind::classify(
                &RemoteEntity::KnowledgeItem(expected),
                &RemoteEntity::KnowledgeItem(actual)
            ),
            ConflictKind::Update
        );
    }

    #[test]
    fn classify_reordered_messages() {
        let mut expected = Conversation::new("user-1", "Ideas");
        expected.push_message(Message::new("user", "first"));
        expected.push_message(Message::new("user", "second"));

        let mut actual = expected.clone();
        actual.messages.reverse();

        assert_eq!(
            ConflictKind::classify(
                &RemoteEntity::Conversation(expected),
                &RemoteEntity::Conversation(actual)
            ),
            ConflictKind::Reorder
        );
    }

    #[test]
    fn classify_added_message_is_update() {
        let mut expected = Conversation::new("user-1", "Ideas");
        expected.push_message(Message::new("user", "first"));

        let mut actual = expected.clone();
        actual.push_message(Message::new("assistant", "reply"));

        assert_eq!(
            ConflictKind::classify(
                &RemoteEntity::Conversation(expected),
                &RemoteEntity::Conversation(actual)
            ),
            ConflictKind::Update
        );
    }
}
