//! Client-side synchronization with the shared store
//!
//! - `replica`: the local copy of one game and the reducer applying feed events
//! - `placements`: replace-style broadcast of in-progress tiles
//! - `connection`: subscriptions, connectivity status and reconnects

pub mod connection;
pub mod placements;
pub mod replica;

pub use crate::storage::feed::FeedEvent;
pub use connection::{ConnectionStatus, SessionConnection, Snapshot, RETRY_INTERVAL};
pub use replica::{Applied, Replica};
