//! `relay-store` — durable, append-only log of ingested messages.
//!
//! Messages live in a single SQLite `messages` table keyed by channel and
//! source timestamp. Each row carries a relay-state flag that moves from
//! `pending` to `relayed` exactly once; rows are never deleted.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::MessageStore;
