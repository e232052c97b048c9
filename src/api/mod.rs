//! Pesto - HTTP API
//!
//! warp routes over the clipboard service, plus the OpenAPI document

pub mod handlers;
pub mod openapi;
pub mod response;
pub mod routes;

pub use handlers::ApiContext;
pub use response::{ApiError, ErrorBody};
pub use routes::routes;
