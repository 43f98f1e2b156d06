//! Catalog Feed - paged catalog streams over an expiring disk cache
//!
//! Provides a generic TTL disk cache, a cancellable page sequencer and a
//! feed controller that combines them, served over a small HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod paging;
pub mod tasks;

pub use api::AppState;
pub use cache::ExpiringCache;
pub use config::Config;
pub use feed::{FeedController, FetchState, PageSource, QuerySignature};
pub use paging::PageSequencer;
pub use tasks::spawn_cleanup_task;
