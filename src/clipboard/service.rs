//! Pesto - Clipboard item service
//!
//! Keeps the "at most one current item" rule on top of a `ClipboardStore`.
//! Create runs its read-demote-insert sequence under a lock scoped to the
//! current slot; every other operation passes straight through to the store.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::models::{ClipboardItem, NewClipboardItem};
use crate::config::{DemotionPolicy, Settings, StorageLimit};
use crate::storage::{ClipboardStore, Promotion, PromotionRules, StoreError};

/// Default number of search results
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("clipboard item".to_string()),
            other => ServiceError::Store(other),
        }
    }
}

/// Knobs that shape Create
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub demotion: DemotionPolicy,
    pub ignore_duplicates: bool,
    pub storage_limit: StorageLimit,
}

impl From<&Settings> for HistoryPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            demotion: settings.demotion,
            ignore_duplicates: settings.ignore_duplicates,
            storage_limit: settings.storage_limit,
        }
    }
}

/// Clipboard history service
pub struct ClipboardService {
    store: Arc<dyn ClipboardStore>,
    policy: HistoryPolicy,
    /// Serializes writers of the current flag
    current_slot: Mutex<()>,
}

impl ClipboardService {
    pub fn new(store: Arc<dyn ClipboardStore>, policy: HistoryPolicy) -> Self {
        Self {
            store,
            policy,
            current_slot: Mutex::new(()),
        }
    }

    /// Store a new item and make it the current one
    ///
    /// The previous current item, if any, is demoted first. With
    /// `DemotionPolicy::Strict` a failed demotion aborts the create and nothing
    /// is inserted; with `BestEffort` it is logged and the insert goes ahead.
    /// With `ignore_duplicates`, a payload equal to the newest item is not
    /// stored again and that item is returned as is.
    pub async fn create(&self, input: NewClipboardItem) -> Result<ClipboardItem, ServiceError> {
        validate(&input)?;

        let _slot = self.current_slot.lock().await;

        let rules = PromotionRules {
            demotion: self.policy.demotion,
            skip_duplicate: self.policy.ignore_duplicates,
        };
        let created = match self.store.promote(&input.into_item(), rules).await? {
            Promotion::Inserted(item) => item,
            Promotion::Unchanged(newest) => {
                log::debug!("Item {} already holds this content, skipping create", newest.id);
                return Ok(newest);
            }
        };
        log::info!("Saved clipboard item with id: {}", created.id);

        if let Some(keep) = self.policy.storage_limit.max_items() {
            match self.store.prune(keep).await {
                Ok(0) => {}
                Ok(n) => log::info!("Pruned {} old clipboard items", n),
                Err(e) => log::warn!("Failed to prune old items: {}", e),
            }
        }

        Ok(created)
    }

    /// All items, newest first
    pub async fn get_all(&self) -> Result<Vec<ClipboardItem>, ServiceError> {
        Ok(self.store.get_all().await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ClipboardItem, ServiceError> {
        self.store.get_by_id(id).await.map_err(|e| match e {
            StoreError::NotFound => ServiceError::NotFound(format!("clipboard item {}", id)),
            other => ServiceError::Store(other),
        })
    }

    /// Items whose content type matches exactly
    pub async fn get_by_content_type(&self, content_type: &str) -> Result<Vec<ClipboardItem>, ServiceError> {
        Ok(self.store.get_by_content_type(content_type).await?)
    }

    pub async fn get_current(&self) -> Result<ClipboardItem, ServiceError> {
        self.store.get_current().await.map_err(|e| match e {
            StoreError::NotFound => ServiceError::NotFound("no current clipboard item".to_string()),
            other => ServiceError::Store(other),
        })
    }

    /// Delete an item; deleting the current one leaves no current item
    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.store.delete(id).await?;
        log::info!("Deleted clipboard item {}", id);
        Ok(())
    }

    /// Persist a loaded item as given
    pub async fn update(&self, item: &ClipboardItem) -> Result<(), ServiceError> {
        self.store.update(item).await.map_err(|e| match e {
            StoreError::NotFound => ServiceError::NotFound(format!("clipboard item {}", item.id)),
            other => ServiceError::Store(other),
        })
    }

    /// Replace content and content type of an item, keeping its current flag
    pub async fn edit(&self, id: i64, input: NewClipboardItem) -> Result<ClipboardItem, ServiceError> {
        validate(&input)?;

        let mut item = self.get_by_id(id).await?;
        item.content = input.content;
        item.content_type = input.content_type;
        self.update(&item).await?;
        self.get_by_id(id).await
    }

    /// Items whose content contains `query`, newest first; an empty query lists the newest
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<ClipboardItem>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        Ok(self.store.search(query, limit).await?)
    }
}

fn validate(input: &NewClipboardItem) -> Result<(), ServiceError> {
    match input.missing_field() {
        Some(field) => Err(ServiceError::Validation(format!("{} is required", field))),
        None => Ok(()),
    }
}
