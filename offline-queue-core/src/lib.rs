//! Offline message buffering for agent gateways
//!
//! When the host cannot reach the network, inbound channel messages are
//! persisted to a durable SQLite queue instead of being processed. Once
//! connectivity returns, the sync engine replays them in order through
//! the host's normal ingestion pipeline.

pub mod bus;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod gate;
pub mod logging;
pub mod queue;
pub mod service;
pub mod sync;
pub mod utils;

pub use bus::InboundMessage;
pub use config::{ConfigLoader, OfflineQueueConfig};
pub use connectivity::{
    check_gateway, ConnectivityMonitor, ConnectivityProbe, ConnectivityState, HttpProbe,
    StateChange,
};
pub use error::{Error, Result};
pub use gate::{IntakeDecision, IntakeGate};
pub use queue::{MessageQueue, MessageStatus, QueueStats, QueuedMessage};
pub use service::{OfflineQueueService, StatusReport};
pub use sync::{Reinjector, SyncConfig, SyncEngine, SyncReport};
