//! Pesto - Database operations module
//!
//! Uses SQLite to store clipboard history records

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{demotion_failed, ClipboardStore, Promotion, PromotionRules, StoreError};
use crate::clipboard::models::now_micros;
use crate::clipboard::ClipboardItem;

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "clipboard.db";

const SCHEMA: &str = r#"
    -- Clipboard history table
    CREATE TABLE IF NOT EXISTS clipboard_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        content_type TEXT NOT NULL,
        is_current INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    );

    -- Indexes
    CREATE INDEX IF NOT EXISTS idx_items_created_at ON clipboard_items(created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_items_content_type ON clipboard_items(content_type);
    CREATE INDEX IF NOT EXISTS idx_items_is_current ON clipboard_items(is_current);
"#;

const COLUMNS: &str = "id, content, content_type, is_current, created_at, updated_at, deleted_at";

/// SQLite-backed clipboard store
///
/// One connection shared behind a mutex; every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database inside `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        // Ensure data directory exists
        fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join(DATABASE_FILE);
        log::info!("Opening database at: {:?}", db_path);

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_schema(conn)
    }

    /// Private in-memory database, gone when the store is dropped
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        log::debug!("Database schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        self.with_conn_cancellable(move |conn, _| f(conn)).await
    }

    /// Like `with_conn`, handing `f` the flag raised once the caller stops waiting
    ///
    /// Work still queued behind the connection lock when the future is dropped
    /// never starts.
    async fn with_conn_cancellable<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &Cancellation) -> Result<T, StoreError> + Send + 'static,
    {
        let cancel = Cancellation::default();
        let _armed = CancelOnDrop(cancel.clone());

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            cancel.check()?;
            f(&guard, &cancel)
        })
        .await?
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}

/// Raised when the caller of a blocking store call has gone away
#[derive(Clone, Default)]
struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.0.load(Ordering::SeqCst) {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }
}

struct CancelOnDrop(Cancellation);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed width keeps text order equal to time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ClipboardItem> {
    let deleted_at = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(parse_timestamp(6, &raw)?),
        None => None,
    };
    Ok(ClipboardItem {
        id: row.get(0)?,
        content: row.get(1)?,
        content_type: row.get(2)?,
        is_current: row.get(3)?,
        created_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
        updated_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
        deleted_at,
    })
}

fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn insert_row(conn: &Connection, item: &ClipboardItem) -> Result<ClipboardItem, StoreError> {
    let now = now_micros();
    conn.execute(
        r#"
        INSERT INTO clipboard_items
        (content, content_type, is_current, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        "#,
        params![item.content, item.content_type, item.is_current, format_timestamp(&now)],
    )?;

    let mut created = item.clone();
    created.id = conn.last_insert_rowid();
    created.created_at = now;
    created.updated_at = now;
    created.deleted_at = None;
    Ok(created)
}

fn current_row(conn: &Connection) -> Result<Option<ClipboardItem>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM clipboard_items
         WHERE is_current = 1 AND deleted_at IS NULL
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))?;
    Ok(stmt.query_row([], row_to_item).optional()?)
}

fn newest_row(conn: &Connection) -> Result<Option<ClipboardItem>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM clipboard_items
         WHERE deleted_at IS NULL
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))?;
    Ok(stmt.query_row([], row_to_item).optional()?)
}

#[async_trait]
impl ClipboardStore for SqliteStore {
    async fn create(&self, item: &ClipboardItem) -> Result<ClipboardItem, StoreError> {
        let item = item.clone();
        self.with_conn(move |conn| insert_row(conn, &item)).await
    }

    async fn get_all(&self) -> Result<Vec<ClipboardItem>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM clipboard_items
                 WHERE deleted_at IS NULL
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let items = stmt
                .query_map([], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> Result<ClipboardItem, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM clipboard_items
                 WHERE id = ?1 AND deleted_at IS NULL"
            ))?;
            stmt.query_row([id], row_to_item)
                .optional()?
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn get_by_content_type(&self, content_type: &str) -> Result<Vec<ClipboardItem>, StoreError> {
        let content_type = content_type.to_owned();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM clipboard_items
                 WHERE content_type = ?1 AND deleted_at IS NULL
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let items = stmt
                .query_map([&content_type], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    async fn get_current(&self) -> Result<ClipboardItem, StoreError> {
        self.with_conn(|conn| current_row(conn)?.ok_or(StoreError::NotFound)).await
    }

    async fn update(&self, item: &ClipboardItem) -> Result<(), StoreError> {
        let item = item.clone();
        self.with_conn(move |conn| {
            let affected = conn.execute(
                r#"
                UPDATE clipboard_items
                SET content = ?1, content_type = ?2, is_current = ?3, updated_at = ?4
                WHERE id = ?5 AND deleted_at IS NULL
                "#,
                params![
                    item.content,
                    item.content_type,
                    item.is_current,
                    format_timestamp(&now_micros()),
                    item.id,
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let affected = conn.execute(
                "UPDATE clipboard_items SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![format_timestamp(&now_micros()), id],
            )?;
            if affected == 0 {
                log::debug!("Delete of item {} matched nothing", id);
            }
            Ok(())
        })
        .await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ClipboardItem>, StoreError> {
        let query = query.to_owned();
        self.with_conn(move |conn| {
            // instr() is a literal, case-sensitive match; LIKE would treat % and _ as wildcards
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM clipboard_items
                 WHERE (?1 = '' OR instr(content, ?1) > 0) AND deleted_at IS NULL
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            ))?;
            let items = stmt
                .query_map(params![query, sql_limit(limit)], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    async fn prune(&self, keep: usize) -> Result<u64, StoreError> {
        self.with_conn(move |conn| {
            // Tombstone everything past the newest `keep` live records, never the current one
            let pruned = conn.execute(
                r#"
                UPDATE clipboard_items SET deleted_at = ?1
                WHERE deleted_at IS NULL
                  AND is_current = 0
                  AND id NOT IN (
                      SELECT id FROM clipboard_items
                      WHERE deleted_at IS NULL
                      ORDER BY created_at DESC, id DESC
                      LIMIT ?2
                  )
                "#,
                params![format_timestamp(&now_micros()), sql_limit(keep)],
            )?;
            Ok(pruned as u64)
        })
        .await
    }

    async fn promote(&self, item: &ClipboardItem, rules: PromotionRules) -> Result<Promotion, StoreError> {
        let item = item.clone();
        self.with_conn_cancellable(move |conn, cancel| {
            let tx = conn.unchecked_transaction()?;

            if rules.skip_duplicate {
                if let Some(newest) = newest_row(&tx)? {
                    if newest.same_payload(&item) {
                        return Ok(Promotion::Unchanged(newest));
                    }
                }
            }

            if let Some(previous) = current_row(&tx)? {
                let demoted = tx.execute(
                    "UPDATE clipboard_items SET is_current = 0, updated_at = ?1
                     WHERE is_current = 1 AND deleted_at IS NULL",
                    params![format_timestamp(&now_micros())],
                );
                if let Err(e) = demoted {
                    demotion_failed(rules.demotion, previous.id, e.into())?;
                }
            }

            let mut item = item;
            item.is_current = true;
            let created = insert_row(&tx, &item)?;

            // Nothing commits once the caller has gone
            cancel.check()?;
            tx.commit()?;
            Ok(Promotion::Inserted(created))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert(store: &SqliteStore, content: &str, content_type: &str, current: bool) -> ClipboardItem {
        let mut item = ClipboardItem::new(content, content_type);
        item.is_current = current;
        store.create(&item).await.unwrap()
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamps() {
        let store = SqliteStore::open_in_memory().unwrap();

        let first = insert(&store, "hello", "text", true).await;
        let second = insert(&store, "world", "text", false).await;

        assert!(first.id > 0);
        assert!(second.id > first.id);
        assert_eq!(first.created_at, first.updated_at);

        let loaded = store.get_by_id(first.id).await.unwrap();
        assert_eq!(loaded, first);
    }

    #[tokio::test]
    async fn get_all_is_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_all().await.unwrap().is_empty());

        let a = insert(&store, "a", "text", false).await;
        let b = insert(&store, "b", "url", false).await;
        let c = insert(&store, "c", "text", false).await;

        let ids: Vec<i64> = store.get_all().await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[tokio::test]
    async fn content_type_match_is_exact() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, "a", "text", false).await;
        insert(&store, "b", "Text", false).await;
        let url = insert(&store, "c", "url", false).await;

        let texts = store.get_by_content_type("text").await.unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].content, "a");

        let urls = store.get_by_content_type("url").await.unwrap();
        assert_eq!(urls, vec![url]);

        assert!(store.get_by_content_type("image").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(matches!(store.get_by_id(99).await, Err(StoreError::NotFound)));
        assert!(matches!(store.get_current().await, Err(StoreError::NotFound)));

        let ghost = ClipboardItem::new("ghost", "text");
        assert!(matches!(store.update(&ghost).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn update_persists_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut item = insert(&store, "draft", "text", true).await;

        item.content = "final".to_string();
        item.content_type = "note".to_string();
        item.is_current = false;
        store.update(&item).await.unwrap();

        let loaded = store.get_by_id(item.id).await.unwrap();
        assert_eq!(loaded.content, "final");
        assert_eq!(loaded.content_type, "note");
        assert!(!loaded.is_current);
        assert_eq!(loaded.created_at, item.created_at);
        assert!(loaded.updated_at >= item.updated_at);
        assert!(matches!(store.get_current().await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn delete_hides_record_everywhere() {
        let store = SqliteStore::open_in_memory().unwrap();
        let item = insert(&store, "secret", "text", true).await;

        store.delete(item.id).await.unwrap();

        assert!(matches!(store.get_by_id(item.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.get_current().await, Err(StoreError::NotFound)));
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(store.get_by_content_type("text").await.unwrap().is_empty());
        assert!(store.search("secret", 10).await.unwrap().is_empty());
        assert!(matches!(store.update(&item).await, Err(StoreError::NotFound)));

        // Deleting again is a no-op
        store.delete(item.id).await.unwrap();
        store.delete(12345).await.unwrap();

        let tombstone: Option<String> = store
            .conn
            .lock()
            .query_row("SELECT deleted_at FROM clipboard_items WHERE id = ?1", [item.id], |row| row.get(0))
            .unwrap();
        assert!(tombstone.is_some());
    }

    #[tokio::test]
    async fn search_matches_literal_substrings() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, "100% done", "text", false).await;
        insert(&store, "1000 done", "text", false).await;
        insert(&store, "snake_case", "text", false).await;
        insert(&store, "snakeXcase", "text", false).await;

        let percent = store.search("0%", 10).await.unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].content, "100% done");

        let underscore = store.search("e_c", 10).await.unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].content, "snake_case");

        let limited = store.search("done", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].content, "1000 done");
    }

    #[tokio::test]
    async fn prune_keeps_newest_and_current() {
        let store = SqliteStore::open_in_memory().unwrap();
        let current = insert(&store, "oldest but current", "text", true).await;
        for n in 0..4 {
            insert(&store, &format!("item {n}"), "text", false).await;
        }

        let pruned = store.prune(2).await.unwrap();
        assert_eq!(pruned, 2);

        let remaining: Vec<String> = store.get_all().await.unwrap().into_iter().map(|i| i.content).collect();
        assert_eq!(remaining, vec!["item 3", "item 2", "oldest but current"]);
        assert_eq!(store.get_current().await.unwrap().id, current.id);

        assert_eq!(store.prune(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_search_lists_newest() {
        let store = SqliteStore::open_in_memory().unwrap();
        for n in 0..4 {
            insert(&store, &format!("entry {n}"), "text", false).await;
        }

        let newest: Vec<String> = store.search("", 2).await.unwrap().into_iter().map(|i| i.content).collect();
        assert_eq!(newest, vec!["entry 3", "entry 2"]);
    }

    fn inserted(promotion: Promotion) -> ClipboardItem {
        match promotion {
            Promotion::Inserted(item) => item,
            other => panic!("expected an insert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn promote_demotes_previous_current() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rules = PromotionRules::default();

        let first = inserted(store.promote(&ClipboardItem::new("first", "text"), rules).await.unwrap());
        assert!(first.is_current);
        let second = inserted(store.promote(&ClipboardItem::new("second", "text"), rules).await.unwrap());

        assert_eq!(store.get_current().await.unwrap(), second);
        assert!(!store.get_by_id(first.id).await.unwrap().is_current);
    }

    #[tokio::test]
    async fn promote_skips_payload_of_newest() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rules = PromotionRules {
            skip_duplicate: true,
            ..PromotionRules::default()
        };

        let first = inserted(store.promote(&ClipboardItem::new("same", "text"), rules).await.unwrap());
        let again = store.promote(&ClipboardItem::new("same", "text"), rules).await.unwrap();
        assert_eq!(again, Promotion::Unchanged(first.clone()));
        assert_eq!(store.get_all().await.unwrap(), vec![first]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_promote_changes_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = insert(&store, "first", "text", true).await;

        let conn = store.connection();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let late = ClipboardItem::new("late", "text");
        let attempt = tokio::time::timeout(
            Duration::from_millis(50),
            store.promote(&late, PromotionRules::default()),
        )
        .await;
        assert!(attempt.is_err());
        holder.join().unwrap();

        assert_eq!(store.get_all().await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO clipboard_items (content, content_type, is_current, created_at, updated_at)
                 VALUES ('x', 'text', 0, 'yesterday', 'yesterday')",
                [],
            )
            .unwrap();

        let err = store.get_all().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(4, Type::Text, _))
        ));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        let id = {
            let store = SqliteStore::open(&data_dir).unwrap();
            insert(&store, "persisted", "text", true).await.id
        };

        assert!(data_dir.join(DATABASE_FILE).exists());
        let store = SqliteStore::open(&data_dir).unwrap();
        let current = store.get_current().await.unwrap();
        assert_eq!(current.id, id);
        assert_eq!(current.content, "persisted");
    }
}
