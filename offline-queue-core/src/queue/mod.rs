//! Durable message queue
//!
//! Persists inbound messages that arrive while the host is offline so they
//! survive restarts and can be replayed in FIFO order once connectivity
//! returns. The queue knows nothing about connectivity or replay policy.

pub mod store;
pub mod types;

pub use store::MessageQueue;
pub use types::{MessageStatus, QueueStats, QueuedMessage};
