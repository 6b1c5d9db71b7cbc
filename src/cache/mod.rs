//! Fetch cache for offline reads.
//!
//! Requests are routed by URL to one of three strategies:
//! - static assets (by extension) are served cache-first
//! - API reads (by path prefix) are network-first with a cache fallback
//! - everything else is stale-while-revalidate
//!
//! Non-GET and non-http(s) requests are not intercepted. Caches are
//! versioned; activating a version deletes caches of every other version.

mod layer;
mod storage;
mod strategy;
mod traits;

pub use layer::FetchCache;
pub use storage::SqliteResponseCache;
pub use strategy::Router;
pub use traits::{FetchRequest, ResponseSource, WorkerMessage};
