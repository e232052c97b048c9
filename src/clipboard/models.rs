//! Pesto - Clipboard item data models
//!
//! Defines the stored clipboard entry and the shapes it takes on the wire

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Stored clipboard history record
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardItem {
    /// Unique identifier, 0 until the store assigns one
    pub id: i64,
    /// Text payload
    pub content: String,
    /// Free-form classification tag ("text", "image", "url", ...)
    pub content_type: String,
    /// Whether this is the current clipboard item
    pub is_current: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Tombstone, set when the item is deleted
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ClipboardItem {
    /// Create an unsaved record; the store assigns id and timestamps on insert
    pub fn new(content: impl Into<String>, content_type: impl Into<String>) -> Self {
        let now = now_micros();
        Self {
            id: 0,
            content: content.into(),
            content_type: content_type.into(),
            is_current: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether `other` carries the same payload
    pub fn same_payload(&self, other: &ClipboardItem) -> bool {
        self.content == other.content && self.content_type == other.content_type
    }
}

/// Current time truncated to the precision the store keeps
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Request body for creating or editing an item
///
/// Unknown fields (`id`, timestamps, `is_current`) are accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewClipboardItem {
    pub content: String,
    pub content_type: String,
}

impl NewClipboardItem {
    pub fn new(content: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
        }
    }

    /// Check required fields, returning the name of the first empty one
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.content.is_empty() {
            Some("content")
        } else if self.content_type.is_empty() {
            Some("content_type")
        } else {
            None
        }
    }

    /// Build the unsaved record
    pub fn into_item(self) -> ClipboardItem {
        ClipboardItem::new(self.content, self.content_type)
    }
}

/// Record as returned over HTTP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipboardItemView {
    pub id: i64,
    pub content: String,
    pub content_type: String,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ClipboardItem> for ClipboardItemView {
    fn from(item: ClipboardItem) -> Self {
        Self {
            id: item.id,
            content: item.content,
            content_type: item.content_type,
            is_current: item.is_current,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}
