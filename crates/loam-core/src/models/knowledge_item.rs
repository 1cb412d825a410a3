//! Knowledge item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a knowledge item, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnowledgeItemId(Uuid);

impl KnowledgeItemId {
    /// Create a new unique knowledge item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for KnowledgeItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KnowledgeItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KnowledgeItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note in the knowledge base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique identifier
    pub id: KnowledgeItemId,
    /// Owning user
    pub user_id: String,
    /// Display title
    pub title: String,
    /// Body text
    pub content: String,
    /// Tags, deduplicated, case-sensitive
    pub tags: Vec<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl KnowledgeItem {
    /// Create a new knowledge item
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: KnowledgeItemId::new(),
            user_id: user_id.into(),
            title: title.into(),
            content: content.into(),
            tags: dedup_tags(tags),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a tag if not already present, advancing `updated_at`
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
            self.updated_at = chrono::Utc::now().timestamp_millis().max(self.updated_at);
        }
    }
}

/// Deduplicate tags preserving first-seen order (case-sensitive)
#[must_use]
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_item_id_parse_roundtrip() {
        let id = KnowledgeItemId::new();
        let parsed: KnowledgeItemId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn new_item_dedups_tags() {
        let item = KnowledgeItem::new(
            "user-1",
            "Title",
            "Body",
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );
        assert_eq!(item.tags, vec!["a", "b"]);
    }

    #[test]
    fn dedup_tags_is_case_sensitive() {
        let tags = dedup_tags(vec!["Rust".to_string(), "rust".to_string()]);
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn add_tag_skips_duplicates() {
        let mut item = KnowledgeItem::new("user-1", "Title", "Body", vec!["a".to_string()]);
        item.add_tag("a");
        item.add_tag("b");
        assert_eq!(item.tags, vec!["a", "b"]);
    }
}
