//! Data models for loam

mod conversation;
mod knowledge_item;

pub use conversation::{Conversation, ConversationId, Message, MessageId};
pub use knowledge_item::{dedup_tags, KnowledgeItem, KnowledgeItemId};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two entity collections subject to offline queuing and conflict handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Conversation,
    KnowledgeItem,
}

impl EntityKind {
    /// Remote collection name for this entity kind
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Conversation => "conversations",
            Self::KnowledgeItem => "knowledge_items",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversations" => Ok(Self::Conversation),
            "knowledge_items" => Ok(Self::KnowledgeItem),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown entity kind: {other}"
            ))),
        }
    }
}

/// An entity record as exchanged with the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteEntity {
    Conversation(Conversation),
    KnowledgeItem(KnowledgeItem),
}

impl RemoteEntity {
    /// Which collection this record belongs to
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Conversation(_) => EntityKind::Conversation,
            Self::KnowledgeItem(_) => EntityKind::KnowledgeItem,
        }
    }

    /// String form of the record's id
    #[must_use]
    pub fn entity_id(&self) -> String {
        match self {
            Self::Conversation(c) => c.id.to_string(),
            Self::KnowledgeItem(k) => k.id.to_string(),
        }
    }

    /// Owner of the record
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Conversation(c) => &c.user_id,
            Self::KnowledgeItem(k) => &k.user_id,
        }
    }

    /// Display title, if the record carries one
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Conversation(c) => Some(&c.title),
            Self::KnowledgeItem(k) => Some(&k.title),
        }
    }

    /// Last modification timestamp (Unix ms)
    #[must_use]
    pub const fn updated_at(&self) -> i64 {
        match self {
            Self::Conversation(c) => c.updated_at,
            Self::KnowledgeItem(k) => k.updated_at,
        }
    }
}
