pub mod client;
pub mod offline_client;
pub mod records;
pub mod reorder;
pub mod types;

pub use client::{join_below, ApiClient};
pub use offline_client::{OfflineApi, WriteOutcome};
