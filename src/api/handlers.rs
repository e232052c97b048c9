//! Pesto - HTTP handlers
//!
//! One handler per route; each answers a full response and never rejects

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use utoipa::openapi::OpenApi;
use warp::http::StatusCode;
use warp::reply::Response;

use super::response::{json, respond, ApiError, DeletedBody};
use crate::clipboard::{ClipboardItem, ClipboardItemView, ClipboardService, NewClipboardItem, ServiceError};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiContext {
    service: Arc<ClipboardService>,
    timeout: Duration,
}

impl ApiContext {
    pub fn new(service: Arc<ClipboardService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Run a service call under the request deadline
    async fn run<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::DeadlineExceeded(self.timeout)),
        }
    }
}

/// Query string of the search route
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadRequest(format!("invalid clipboard item id {:?}", raw))),
    }
}

fn views(items: Vec<ClipboardItem>) -> Vec<ClipboardItemView> {
    items.into_iter().map(ClipboardItemView::from).collect()
}

/// POST /clipboard-items
pub async fn create_item(input: NewClipboardItem, ctx: ApiContext) -> Result<Response, Infallible> {
    let result = ctx.run(ctx.service.create(input)).await.map(ClipboardItemView::from);
    Ok(respond(result, StatusCode::CREATED))
}

/// GET /clipboard-items
pub async fn list_items(ctx: ApiContext) -> Result<Response, Infallible> {
    let result = ctx.run(ctx.service.get_all()).await.map(views);
    Ok(respond(result, StatusCode::OK))
}

/// GET /clipboard-items/{id}
pub async fn get_item(raw_id: String, ctx: ApiContext) -> Result<Response, Infallible> {
    let result = match parse_id(&raw_id) {
        Ok(id) => ctx.run(ctx.service.get_by_id(id)).await.map(ClipboardItemView::from),
        Err(e) => Err(e),
    };
    Ok(respond(result, StatusCode::OK))
}

/// GET /clipboard-items/content/{content_type}
pub async fn list_by_content_type(raw_type: String, ctx: ApiContext) -> Result<Response, Infallible> {
    let result = match urlencoding::decode(&raw_type) {
        Ok(content_type) => ctx
            .run(ctx.service.get_by_content_type(&content_type))
            .await
            .map(views),
        Err(e) => Err(ApiError::BadRequest(format!("invalid content type: {}", e))),
    };
    Ok(respond(result, StatusCode::OK))
}

/// GET /clipboard-items/current
pub async fn get_current(ctx: ApiContext) -> Result<Response, Infallible> {
    let result = ctx.run(ctx.service.get_current()).await.map(ClipboardItemView::from);
    Ok(respond(result, StatusCode::OK))
}

/// GET /clipboard-items/search
pub async fn search_items(query: SearchQuery, ctx: ApiContext) -> Result<Response, Infallible> {
    let result = ctx.run(ctx.service.search(&query.q, query.limit)).await.map(views);
    Ok(respond(result, StatusCode::OK))
}

/// PUT /clipboard-items/{id}
pub async fn edit_item(raw_id: String, input: NewClipboardItem, ctx: ApiContext) -> Result<Response, Infallible> {
    let result = match parse_id(&raw_id) {
        Ok(id) => ctx.run(ctx.service.edit(id, input)).await.map(ClipboardItemView::from),
        Err(e) => Err(e),
    };
    Ok(respond(result, StatusCode::OK))
}

/// DELETE /clipboard-items/{id}
pub async fn delete_item(raw_id: String, ctx: ApiContext) -> Result<Response, Infallible> {
    let result = match parse_id(&raw_id) {
        Ok(id) => ctx
            .run(ctx.service.delete(id))
            .await
            .map(|()| DeletedBody { id, deleted: true }),
        Err(e) => Err(e),
    };
    Ok(respond(result, StatusCode::OK))
}

/// GET /openapi.json
pub async fn openapi_document(doc: Arc<OpenApi>) -> Result<Response, Infallible> {
    Ok(json(doc.as_ref(), StatusCode::OK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::HistoryPolicy;
    use crate::storage::{ClipboardStore, SqliteStore, StoreError};
    use async_trait::async_trait;
    use std::future::pending;

    /// Store whose calls never complete
    struct StalledStore;

    #[async_trait]
    impl ClipboardStore for StalledStore {
        async fn create(&self, _item: &ClipboardItem) -> Result<ClipboardItem, StoreError> {
            pending().await
        }

        async fn get_all(&self) -> Result<Vec<ClipboardItem>, StoreError> {
            pending().await
        }

        async fn get_by_id(&self, _id: i64) -> Result<ClipboardItem, StoreError> {
            pending().await
        }

        async fn get_by_content_type(&self, _content_type: &str) -> Result<Vec<ClipboardItem>, StoreError> {
            pending().await
        }

        async fn get_current(&self) -> Result<ClipboardItem, StoreError> {
            pending().await
        }

        async fn update(&self, _item: &ClipboardItem) -> Result<(), StoreError> {
            pending().await
        }

        async fn delete(&self, _id: i64) -> Result<(), StoreError> {
            pending().await
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<ClipboardItem>, StoreError> {
            pending().await
        }

        async fn prune(&self, _keep: usize) -> Result<u64, StoreError> {
            pending().await
        }
    }

    fn stalled_context() -> ApiContext {
        let service = ClipboardService::new(Arc::new(StalledStore), HistoryPolicy::default());
        ApiContext::new(Arc::new(service), Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_answers_gateway_timeout() {
        let ctx = stalled_context();

        let res = get_current(ctx.clone()).await.unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

        let res = create_item(NewClipboardItem::new("x", "text"), ctx.clone()).await.unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

        let res = delete_item("3".to_string(), ctx).await.unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_create_leaves_history_untouched() {
        let store = SqliteStore::open_in_memory().unwrap();
        let service = Arc::new(ClipboardService::new(Arc::new(store.clone()), HistoryPolicy::default()));
        let ctx = ApiContext::new(Arc::clone(&service), Duration::from_millis(100));
        let first = service.create(NewClipboardItem::new("first", "text")).await.unwrap();

        // Keep the connection busy past the request deadline
        let conn = store.connection();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let res = create_item(NewClipboardItem::new("late", "text"), ctx).await.unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        holder.join().unwrap();

        let all = service.get_all().await.unwrap();
        assert_eq!(all, vec![first]);
        assert!(all[0].is_current);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_id_is_rejected_before_the_store() {
        let res = get_item("abc".to_string(), stalled_context()).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("12").unwrap(), 12);
        for raw in ["0", "-3", "abc", "1.5", ""] {
            assert!(matches!(parse_id(raw), Err(ApiError::BadRequest(_))), "{raw}");
        }
    }
}
