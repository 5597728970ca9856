//! Connectivity monitoring
//!
//! Periodically probes a reachability endpoint and notifies subscribers
//! when the host goes online or offline.

pub mod monitor;
pub mod probe;
pub mod types;

pub use monitor::ConnectivityMonitor;
pub use probe::{
    check_gateway, ConnectivityProbe, HttpProbe, DEFAULT_GATEWAY_HOST, DEFAULT_GATEWAY_PORT,
    GATEWAY_PROBE_TIMEOUT, PROBE_TIMEOUT,
};
pub use types::{ConnectivityState, StateChange};
