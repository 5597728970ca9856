//! Operator tools for the offline message queue
//!
//! Exposes status, manual sync, connectivity check, cleanup and inspection
//! as named tools a host can surface to operators or agents.

pub mod base;
pub mod offline;
pub mod registry;

pub use base::{Tool, ToolError};
pub use offline::{
    register_offline_tools, OfflineCheckTool, OfflineCleanupTool, OfflineListTool,
    OfflineStatusTool, OfflineSyncTool,
};
pub use registry::ToolRegistry;
