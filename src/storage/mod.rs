//! Pesto - Storage module
//!
//! Persistence interface for clipboard items and its SQLite implementation

pub mod database;

use async_trait::async_trait;

use crate::clipboard::ClipboardItem;
use crate::config::DemotionPolicy;

pub use database::SqliteStore;

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,
    #[error("Storage call abandoned by its caller")]
    Cancelled,
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How `ClipboardStore::promote` treats the previous records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionRules {
    pub demotion: DemotionPolicy,
    /// Skip the insert when the newest record holds the same payload
    pub skip_duplicate: bool,
}

/// Outcome of `ClipboardStore::promote`
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    /// A new record was inserted as the current one
    Inserted(ClipboardItem),
    /// The newest record already held this payload; nothing changed
    Unchanged(ClipboardItem),
}

/// Durable storage for clipboard items
///
/// Deleted items are invisible to every query. Implementations assign `id`,
/// `created_at` and `updated_at`; callers never set them.
#[async_trait]
pub trait ClipboardStore: Send + Sync {
    /// Insert a new record and return it with its assigned id and timestamps
    async fn create(&self, item: &ClipboardItem) -> Result<ClipboardItem, StoreError>;

    /// All records, newest first
    async fn get_all(&self) -> Result<Vec<ClipboardItem>, StoreError>;

    /// Single record, or `StoreError::NotFound`
    async fn get_by_id(&self, id: i64) -> Result<ClipboardItem, StoreError>;

    /// Records whose content type matches exactly, newest first
    async fn get_by_content_type(&self, content_type: &str) -> Result<Vec<ClipboardItem>, StoreError>;

    /// The record flagged current, or `StoreError::NotFound`
    async fn get_current(&self) -> Result<ClipboardItem, StoreError>;

    /// Persist content, content type and current flag of a loaded record
    async fn update(&self, item: &ClipboardItem) -> Result<(), StoreError>;

    /// Delete a record; missing ids are not an error
    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Records whose content contains `query` literally, newest first.
    /// An empty query matches every record.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ClipboardItem>, StoreError>;

    /// Delete non-current records beyond the newest `keep`, returning how many went
    async fn prune(&self, keep: usize) -> Result<u64, StoreError>;

    /// Demote the current record and insert `item` as the new current one
    ///
    /// The default runs the steps as separate calls. Stores that can should
    /// override it so the whole sequence applies or nothing does.
    async fn promote(&self, item: &ClipboardItem, rules: PromotionRules) -> Result<Promotion, StoreError> {
        if rules.skip_duplicate {
            if let Some(newest) = self.get_all().await?.into_iter().next() {
                if newest.same_payload(item) {
                    return Ok(Promotion::Unchanged(newest));
                }
            }
        }

        let previous = match self.get_current().await {
            Ok(previous) => Some(previous),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e),
        };

        if let Some(mut previous) = previous {
            previous.is_current = false;
            if let Err(e) = self.update(&previous).await {
                demotion_failed(rules.demotion, previous.id, e)?;
            }
        }

        let mut item = item.clone();
        item.is_current = true;
        Ok(Promotion::Inserted(self.create(&item).await?))
    }
}

/// Apply the demotion policy to a failed demotion of record `id`
pub(crate) fn demotion_failed(policy: DemotionPolicy, id: i64, err: StoreError) -> Result<(), StoreError> {
    match policy {
        DemotionPolicy::Strict => {
            log::error!("Failed to demote item {}: {}", id, err);
            Err(err)
        }
        DemotionPolicy::BestEffort => {
            log::warn!("Failed to demote item {}, continuing: {}", id, err);
            Ok(())
        }
    }
}
