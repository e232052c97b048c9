//! Pesto - HTTP routes
//!
//! Fixed segments (`current`, `search`, `content`) are tried before `{id}`.

use std::convert::Infallible;
use std::sync::Arc;

use utoipa::openapi::OpenApi;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use super::handlers::{self, ApiContext, SearchQuery};
use super::response::handle_rejection;

/// Full route tree with JSON error mapping and access logging
pub fn routes(
    ctx: ApiContext,
    doc: Arc<OpenApi>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    get_current(ctx.clone())
        .or(search_items(ctx.clone()))
        .unify()
        .or(list_by_content_type(ctx.clone()))
        .unify()
        .or(get_item(ctx.clone()))
        .unify()
        .or(edit_item(ctx.clone()))
        .unify()
        .or(delete_item(ctx.clone()))
        .unify()
        .or(list_items(ctx.clone()))
        .unify()
        .or(create_item(ctx))
        .unify()
        .or(openapi_document(doc))
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::log("pesto::http"))
}

/// Inject the handler context
fn with_context(ctx: ApiContext) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn create_item(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(ctx))
        .and_then(handlers::create_item)
}

fn list_items(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items")
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(handlers::list_items)
}

fn get_current(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items" / "current")
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(handlers::get_current)
}

fn search_items(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items" / "search")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_context(ctx))
        .and_then(handlers::search_items)
}

fn list_by_content_type(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items" / "content" / String)
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(handlers::list_by_content_type)
}

fn get_item(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items" / String)
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(handlers::get_item)
}

fn edit_item(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items" / String)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_context(ctx))
        .and_then(handlers::edit_item)
}

fn delete_item(ctx: ApiContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("clipboard-items" / String)
        .and(warp::delete())
        .and(with_context(ctx))
        .and_then(handlers::delete_item)
}

fn openapi_document(doc: Arc<OpenApi>) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("openapi.json")
        .and(warp::get())
        .map(move || Arc::clone(&doc))
        .and_then(handlers::openapi_document)
}
