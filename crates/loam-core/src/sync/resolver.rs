//! Conflict resolution
//!
//! Given the two versions of an entity and a chosen strategy, computes the
//! resolved entity and writes it back to the remote store. Resolutions that
//! keep the remote side produce no write.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::ConflictLog;
use crate::error::{Error, Result};
use crate::models::{dedup_tags, Conversation, KnowledgeItem, RemoteEntity};
use crate::remote::RemoteStore;

use super::conflict::Conflict;

/// How to resolve a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The version with the later `updated_at` wins, verbatim
    LastWriteWins,
    /// Combine both versions with type-specific union rules
    Merge,
    /// Explicit user choice: apply the local version
    KeepLocal,
    /// Explicit user choice: keep the remote version
    KeepRemote,
    /// Discard the local change entirely
    Skip,
}

impl ResolutionStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LastWriteWins => "lww",
            Self::Merge => "merge",
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lww" | "last_write_wins" => Ok(Self::LastWriteWins),
            "merge" => Ok(Self::Merge),
            "keep_local" | "local" => Ok(Self::KeepLocal),
            "keep_remote" | "remote" => Ok(Self::KeepRemote),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidInput(format!(
                "Unknown resolution strategy: {other}"
            ))),
        }
    }
}

/// Outcome of resolving one conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The entity to write back, or `None` when the remote side stands
    pub resolved: Option<RemoteEntity>,
    pub strategy: ResolutionStrategy,
    /// When the resolution was computed (Unix ms)
    pub resolved_at: i64,
}

/// Compute the resolved entity for a local/remote pair.
///
/// `remote` is `None` for delete conflicts; only `KeepLocal` resurrects the
/// record in that case.
pub fn resolve(
    local: &RemoteEntity,
    remote: Option<&RemoteEntity>,
    strategy: ResolutionStrategy,
) -> Result<Resolution> {
    if let Some(remote) = remote {
        if remote.kind() != local.kind() {
            return Err(Error::InvalidInput(format!(
                "Cannot resolve across collections: {} vs {}",
                local.kind(),
                remote.kind()
            )));
        }
    }

    let resolved = match strategy {
        ResolutionStrategy::LastWriteWins => remote.and_then(|remote| {
            // Ties go to remote; the server copy is already in place
            (local.updated_at() > remote.updated_at()).then(|| local.clone())
        }),
        ResolutionStrategy::Merge => remote.map(|remote| merge(local, remote)).transpose()?,
        ResolutionStrategy::KeepLocal => Some(local.clone()),
        ResolutionStrategy::KeepRemote | ResolutionStrategy::Skip => None,
    };

    Ok(Resolution {
        resolved,
        strategy,
        resolved_at: chrono::Utc::now().timestamp_millis(),
    })
}

/// Type-specific merge of two versions
fn merge(local: &RemoteEntity, remote: &RemoteEntity) -> Result<RemoteEntity> {
    match (local, remote) {
        (RemoteEntity::Conversation(l), RemoteEntity::Conversation(r)) => {
            Ok(RemoteEntity::Conversation(merge_conversations(l, r)))
        }
        (RemoteEntity::KnowledgeItem(l), RemoteEntity::KnowledgeItem(r)) => {
            Ok(RemoteEntity::KnowledgeItem(merge_knowledge_items(l, r)))
        }
        _ => Err(Error::InvalidInput(
            "Cannot merge entities of different kinds".to_string(),
        )),
    }
}

/// Union of messages from both versions, deduplicated by message id and
/// sorted ascending by timestamp; every other field comes from the remote
/// version
fn merge_conversations(local: &Conversation, remote: &Conversation) -> Conversation {
    let mut merged = remote.clone();

    let mut seen: std::collections::HashSet<_> =
        merged.messages.iter().map(|message| message.id).collect();
    for message in &local.messages {
        if seen.insert(message.id) {
            merged.messages.push(message.clone());
        }
    }
    merged.messages.sort_by_key(|message| message.timestamp);

    merged.updated_at = local.updated_at.max(remote.updated_at);
    merged
}

/// Union of tags from both versions (case-sensitive set union); every other
/// field comes from the remote version
fn merge_knowledge_items(local: &KnowledgeItem, remote: &KnowledgeItem) -> KnowledgeItem {
    let mut merged = remote.clone();

    let mut tags = merged.tags.clone();
    tags.extend(local.tags.iter().cloned());
    merged.tags = dedup_tags(tags);

    merged.updated_at = local.updated_at.max(remote.updated_at);
    merged
}

/// Applies resolutions: writes the winning entity back and records the
/// outcome in the durable conflict log
pub struct ConflictResolver {
    store: Arc<dyn RemoteStore>,
    log: Arc<dyn ConflictLog>,
}

impl ConflictResolver {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, log: Arc<dyn ConflictLog>) -> Self {
        Self { store, log }
    }

    /// Resolve a conflict with the given strategy.
    ///
    /// Upserts the resolved entity when one is produced (keep-local and merge
    /// outcomes); keep-remote and skip write nothing. Either way the
    /// resolution is appended to the conflict log. The caller is responsible
    /// for removing the conflict from the detector's pending set.
    pub async fn apply(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
    ) -> Result<Resolution> {
        let resolution = match (&conflict.expected, strategy) {
            (Some(local), _) => resolve(local, conflict.actual.as_ref(), strategy)?,
            // Without a local snapshot only remote-keeping strategies make sense
            (None, ResolutionStrategy::KeepRemote | ResolutionStrategy::Skip) => Resolution {
                resolved: None,
                strategy,
                resolved_at: chrono::Utc::now().timestamp_millis(),
            },
            (None, _) => {
                return Err(Error::InvalidInput(format!(
                    "Conflict for {} has no local snapshot to resolve with {strategy}",
                    conflict.item_id
                )));
            }
        };

        if let Some(entity) = &resolution.resolved {
            self.store.upsert(entity).await?;
        }

        self.log
            .append(
                &conflict.item_id,
                conflict.entity_kind,
                conflict.expected.as_ref().map_or(0, RemoteEntity::updated_at),
                conflict.actual.as_ref().map_or(0, RemoteEntity::updated_at),
                strategy.as_str(),
            )
            .await?;

        tracing::info!(
            item = %conflict.item_id,
            strategy = %strategy,
            wrote_back = resolution.resolved.is_some(),
            "Conflict resolved"
        );
        Ok(resolution)
    }
}
