//! Operator tools over a running offline queue

use crate::base::{Result, Tool, ToolError};
use crate::registry::ToolRegistry;
use async_trait::async_trait;
use offline_queue_core::utils::ms_to_datetime;
use offline_queue_core::{MessageStatus, OfflineQueueService, QueuedMessage};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_LIST_LIMIT: u64 = 20;
const MAX_WAIT_SECONDS: u64 = 300;

/// Register every offline queue tool against `service`
pub fn register_offline_tools(registry: &mut ToolRegistry, service: Arc<OfflineQueueService>) {
    registry.register(Arc::new(OfflineStatusTool::new(Arc::clone(&service))));
    registry.register(Arc::new(OfflineSyncTool::new(Arc::clone(&service))));
    registry.register(Arc::new(OfflineCheckTool::new(Arc::clone(&service))));
    registry.register(Arc::new(OfflineCleanupTool::new(Arc::clone(&service))));
    registry.register(Arc::new(OfflineListTool::new(service)));
}

fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

fn format_timestamp(ms: Option<i64>) -> String {
    ms.and_then(ms_to_datetime)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Aggregate queue stats plus connectivity state
pub struct OfflineStatusTool {
    service: Arc<OfflineQueueService>,
}

impl OfflineStatusTool {
    pub fn new(service: Arc<OfflineQueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for OfflineStatusTool {
    fn name(&self) -> &str {
        "offline_status"
    }

    fn description(&self) -> &str {
        "Show offline queue status: connectivity and message counts by status."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: Value) -> Result<String> {
        let status = self.service.status().await?;
        let stats = &status.stats;
        let mut out = format!(
            "Connectivity: {}\nAuto sync: {}{}\n\nTotal: {}\nPending: {}\nProcessing: {}\nFailed: {}\nCompleted: {}",
            status.connectivity,
            if status.auto_sync { "on" } else { "off" },
            if status.syncing { " (sync in progress)" } else { "" },
            stats.total,
            stats.pending,
            stats.processing,
            stats.failed,
            stats.completed,
        );
        if stats.oldest_queued_at.is_some() {
            out.push_str(&format!(
                "\nOldest pending: {}",
                format_timestamp(stats.oldest_queued_at)
            ));
        }
        Ok(out)
    }
}

/// Manual drain trigger
pub struct OfflineSyncTool {
    service: Arc<OfflineQueueService>,
}

impl OfflineSyncTool {
    pub fn new(service: Arc<OfflineQueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for OfflineSyncTool {
    fn name(&self) -> &str {
        "offline_sync"
    }

    fn description(&self) -> &str {
        "Replay queued messages now. Failed messages are not retried."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: Value) -> Result<String> {
        let report = self.service.sync_now().await?;
        if report.skipped {
            return Ok("A sync is already in progress.".to_string());
        }

        let mut out = format!(
            "Replayed {} message(s), {} failed.",
            report.completed, report.failed
        );
        if report.recovered > 0 {
            out.push_str(&format!(
                " Recovered {} interrupted message(s).",
                report.recovered
            ));
        }
        if report.interrupted {
            out.push_str(" Stopped early: connectivity lost.");
        }
        Ok(out)
    }
}

/// Probe connectivity now, optionally waiting for it to come back
pub struct OfflineCheckTool {
    service: Arc<OfflineQueueService>,
}

impl OfflineCheckTool {
    pub fn new(service: Arc<OfflineQueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for OfflineCheckTool {
    fn name(&self) -> &str {
        "offline_check"
    }

    fn description(&self) -> &str {
        "Check connectivity immediately. With wait_seconds, wait up to that long for it to come online."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "wait_seconds": {
                    "type": "integer",
                    "description": "Seconds to wait for connectivity (max 300)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let state = self.service.check_now().await;
        if state.is_online() {
            return Ok("Connectivity: online".to_string());
        }

        let wait = optional_u64(&args, "wait_seconds").unwrap_or(0);
        if wait == 0 {
            return Ok(format!("Connectivity: {}", state));
        }
        if wait > MAX_WAIT_SECONDS {
            return Err(ToolError::InvalidArguments(format!(
                "wait_seconds must be at most {}",
                MAX_WAIT_SECONDS
            )));
        }

        if self
            .service
            .monitor()
            .wait_for_online(Duration::from_secs(wait))
            .await
        {
            Ok("Connectivity: online".to_string())
        } else {
            Ok(format!("Connectivity: still {} after {}s", self.service.monitor().state(), wait))
        }
    }
}

/// Age-based removal of finished messages
pub struct OfflineCleanupTool {
    service: Arc<OfflineQueueService>,
}

impl OfflineCleanupTool {
    pub fn new(service: Arc<OfflineQueueService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for OfflineCleanupTool {
    fn name(&self) -> &str {
        "offline_cleanup"
    }

    fn description(&self) -> &str {
        "Delete completed and failed messages older than max_age_hours. Pending messages are never removed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max_age_hours": {
                    "type": "integer",
                    "description": "Age threshold in hours (defaults to the configured retention)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let hours = optional_u64(&args, "max_age_hours")
            .unwrap_or(self.service.config().max_queue_age_hours);
        let removed = self.service.cleanup(hours).await?;
        Ok(format!(
            "Removed {} finished message(s) older than {}h.",
            removed, hours
        ))
    }
}

/// Inspect queued messages, e.g. failures awaiting manual review
pub struct OfflineListTool {
    service: Arc<OfflineQueueService>,
}

impl OfflineListTool {
    pub fn new(service: Arc<OfflineQueueService>) -> Self {
        Self { service }
    }

    fn format_entry(message: &QueuedMessage) -> String {
        let mut line = format!(
            "- {} [{}] {}:{} from {} at {} (attempts: {})",
            message.id,
            message.status,
            message.channel,
            message.chat_id,
            message.sender_id,
            format_timestamp(Some(message.queued_at)),
            message.attempts
        );
        if let Some(error) = &message.last_error {
            line.push_str(&format!("\n  error: {}", error));
        }
        line
    }
}

#[async_trait]
impl Tool for OfflineListTool {
    fn name(&self) -> &str {
        "offline_list"
    }

    fn description(&self) -> &str {
        "List queued messages, oldest first. Filter by status: pending, processing, failed, completed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["pending", "processing", "failed", "completed"]
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum entries to show (default 20)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let status = match args.get("status").and_then(Value::as_str) {
            Some(s) => Some(
                s.parse::<MessageStatus>()
                    .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
            ),
            None => None,
        };
        let limit = optional_u64(&args, "limit").unwrap_or(DEFAULT_LIST_LIMIT);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let messages = self.service.queue().list(status, limit).await?;
        if messages.is_empty() {
            return Ok("No queued messages.".to_string());
        }

        let lines: Vec<String> = messages.iter().map(Self::format_entry).collect();
        Ok(format!("Queued messages:\n{}", lines.join("\n")))
    }
}
