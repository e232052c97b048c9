//! Pesto - Clipboard module
//!
//! Clipboard item models and the service that maintains the current item

pub mod models;
pub mod service;

pub use models::{ClipboardItem, ClipboardItemView, NewClipboardItem};
pub use service::{ClipboardService, HistoryPolicy, ServiceError};
