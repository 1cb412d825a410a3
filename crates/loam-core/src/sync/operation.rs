//! Queued sync operations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationId, EntityKind, KnowledgeItem, KnowledgeItemId, RemoteEntity,
};

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a queued operation does to its entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutation carried by a queued operation.
///
/// One variant per entity/operation combination so the sync engine and the
/// resolver can be matched exhaustively; creates and updates carry the full
/// record, deletes carry only the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationPayload {
    CreateConversation(Conversation),
    UpdateConversation(Conversation),
    DeleteConversation(ConversationId),
    CreateKnowledgeItem(KnowledgeItem),
    UpdateKnowledgeItem(KnowledgeItem),
    DeleteKnowledgeItem(KnowledgeItemId),
}

impl OperationPayload {
    /// Which collection the operation targets
    #[must_use]
    pub const fn entity_kind(&self) -> EntityKind {
        match self {
            Self::CreateConversation(_)
            | Self::UpdateConversation(_)
            | Self::DeleteConversation(_) => EntityKind::Conversation,
            Self::CreateKnowledgeItem(_)
            | Self::UpdateKnowledgeItem(_)
            | Self::DeleteKnowledgeItem(_) => EntityKind::KnowledgeItem,
        }
    }

    /// Create/update/delete classification
    #[must_use]
    pub const fn operation_kind(&self) -> OperationKind {
        match self {
            Self::CreateConversation(_) | Self::CreateKnowledgeItem(_) => OperationKind::Create,
            Self::UpdateConversation(_) | Self::UpdateKnowledgeItem(_) => OperationKind::Update,
            Self::DeleteConversation(_) | Self::DeleteKnowledgeItem(_) => OperationKind::Delete,
        }
    }

    /// String form of the targeted entity id
    #[must_use]
    pub fn entity_id(&self) -> String {
        match self {
            Self::CreateConversation(c) | Self::UpdateConversation(c) => c.id.to_string(),
            Self::DeleteConversation(id) => id.to_string(),
            Self::CreateKnowledgeItem(k) | Self::UpdateKnowledgeItem(k) => k.id.to_string(),
            Self::DeleteKnowledgeItem(id) => id.to_string(),
        }
    }

    /// The carried record, when the operation carries one (creates/updates)
    #[must_use]
    pub fn record(&self) -> Option<RemoteEntity> {
        match self {
            Self::CreateConversation(c) | Self::UpdateConversation(c) => {
                Some(RemoteEntity::Conversation(c.clone()))
            }
            Self::CreateKnowledgeItem(k) | Self::UpdateKnowledgeItem(k) => {
                Some(RemoteEntity::KnowledgeItem(k.clone()))
            }
            Self::DeleteConversation(_) | Self::DeleteKnowledgeItem(_) => None,
        }
    }
}

/// A queued mutation awaiting replay against the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique identifier, generated at enqueue time
    pub id: OperationId,
    /// The mutation itself
    pub payload: OperationPayload,
    /// When the operation was enqueued (Unix ms)
    pub enqueued_at: i64,
    /// Failed apply attempts so far
    pub retry_count: u32,
    /// Message from the most recent failed attempt
    pub last_error: Option<String>,
}

impl SyncOperation {
    /// Wrap a payload in a fresh operation with `retry_count = 0`
    #[must_use]
    pub fn new(payload: OperationPayload) -> Self {
        Self {
            id: OperationId::new(),
            payload,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_classification() {
        let conversation = Conversation::new("user-1", "Ideas");
        let id = conversation.id;
        let payload = OperationPayload::CreateConversation(conversation);

        assert_eq!(payload.entity_kind(), EntityKind::Conversation);
        assert_eq!(payload.operation_kind(), OperationKind::Create);
        assert_eq!(payload.entity_id(), id.to_string());
        assert!(payload.record().is_some());
    }

    #[test]
    fn delete_payload_carries_only_the_id() {
        let id = KnowledgeItemId::new();
        let payload = OperationPayload::DeleteKnowledgeItem(id);

        assert_eq!(payload.operation_kind(), OperationKind::Delete);
        assert_eq!(payload.entity_id(), id.to_string());
        assert!(payload.record().is_none());
    }

    #[test]
    fn payload_serde_roundtrip() {
        let item = KnowledgeItem::new("user-1", "Title", "Body", vec!["tag".to_string()]);
        let payload = OperationPayload::UpdateKnowledgeItem(item);

        let json = serde_json::to_string(&payload).unwrap();
        let parsed: OperationPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn new_operation_starts_unretried() {
        let operation =
            SyncOperation::new(OperationPayload::DeleteConversation(ConversationId::new()));
        assert_eq!(operation.retry_count, 0);
        assert!(operation.last_error.is_none());
        assert!(operation.enqueued_at > 0);
    }
}
