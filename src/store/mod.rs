//! Durable client-side storage for offline support.
//!
//! Records live in named stores (`boards`, `columns`, `cards`,
//! `pending-operations`, `settings`), keyed by id and optionally indexed by
//! parent id. Everything survives restarts; a failed call means the write
//! is not durable.

mod settings;
mod storage;
mod traits;

pub use settings::{last_sync, set_setting, LAST_SYNC};
pub use storage::{LocalStore, SqliteStore};
pub use traits::{CacheResult, CacheSource, Record, StoreName};
