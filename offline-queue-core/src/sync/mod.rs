//! Sync engine: replays queued messages once connectivity returns

pub mod engine;
pub mod reinject;

pub use engine::{SyncConfig, SyncEngine, SyncReport, DEFAULT_REINJECT_TIMEOUT};
pub use reinject::{ReinjectCallback, Reinjector};
