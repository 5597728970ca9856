//! Queue record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::bus::InboundMessage;
use crate::utils::ms_to_datetime;

/// Lifecycle status of a queued message
///
/// `pending -> processing -> {completed | failed}`, plus the recovery edge
/// `processing -> pending`. Completed and failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Processing,
    Failed,
    Completed,
}

impl MessageStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Processing => "processing",
            MessageStatus::Failed => "failed",
            MessageStatus::Completed => "completed",
        }
    }

    /// Whether no further automatic transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Failed | MessageStatus::Completed)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "processing" => Ok(MessageStatus::Processing),
            "failed" => Ok(MessageStatus::Failed),
            "completed" => Ok(MessageStatus::Completed),
            other => Err(crate::Error::Serialization(format!(
                "unknown message status '{}'",
                other
            ))),
        }
    }
}

/// A unit of deferred work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    /// Unique id assigned at enqueue time
    pub id: String,
    pub channel: String,
    pub account_id: String,
    pub sender_id: String,
    pub chat_id: String,
    pub body: String,
    pub media_path: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Enqueue time, epoch milliseconds
    pub queued_at: i64,
    /// Number of times the message entered `processing`
    pub attempts: u32,
    /// Most recent processing attempt, epoch milliseconds
    pub last_attempt_at: Option<i64>,
    pub status: MessageStatus,
    /// Reason recorded by the last failed re-injection
    pub last_error: Option<String>,
}

impl QueuedMessage {
    pub fn queued_at_utc(&self) -> Option<DateTime<Utc>> {
        ms_to_datetime(self.queued_at)
    }

    pub fn last_attempt_at_utc(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at.and_then(ms_to_datetime)
    }

    /// Rebuild the inbound message this record was created from
    pub fn to_inbound(&self) -> InboundMessage {
        InboundMessage {
            channel: self.channel.clone(),
            account_id: self.account_id.clone(),
            sender_id: self.sender_id.clone(),
            chat_id: self.chat_id.clone(),
            body: self.body.clone(),
            media_path: self.media_path.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Aggregate queue counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
    pub completed: u64,
    /// Oldest `queued_at` among pending messages
    pub oldest_queued_at: Option<i64>,
}

impl QueueStats {
    pub fn oldest_queued_at_utc(&self) -> Option<DateTime<Utc>> {
        self.oldest_queued_at.and_then(ms_to_datetime)
    }
}
