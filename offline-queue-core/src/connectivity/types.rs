//! Connectivity state types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Best-effort view of network reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
    /// No probe has completed yet
    Unknown,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
            ConnectivityState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connectivity transition; emitted once per actual state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub previous: ConnectivityState,
    pub current: ConnectivityState,
}

impl StateChange {
    pub fn went_online(&self) -> bool {
        self.current.is_online() && !self.previous.is_online()
    }

    pub fn went_offline(&self) -> bool {
        self.current == ConnectivityState::Offline && self.previous != ConnectivityState::Offline
    }
}
