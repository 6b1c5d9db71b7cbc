//! Offline mutation queue and replay.
//!
//! Mutations made while the server is unreachable are recorded as
//! [`PendingOperation`]s in the local store and replayed in enqueue order
//! by the [`SyncEngine`] once connectivity returns.

mod engine;
mod operation;
mod queue;

pub use engine::{SyncEngine, SyncEvent, SyncReport};
pub use operation::{HttpMethod, OperationType, PendingOperation};
pub use queue::PendingQueue;
