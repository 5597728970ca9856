//! Inbound message type shared by the intake gate and the sync engine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message received from a chat channel, or re-submitted from the queue
///
/// Routing identifiers are opaque: the queue stores and returns them
/// verbatim and never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel identifier (e.g., "telegram", "email")
    pub channel: String,
    /// Account the message arrived on (bot account, mailbox, ...)
    pub account_id: String,
    /// User identifier
    pub sender_id: String,
    /// Chat/channel identifier
    pub chat_id: String,
    /// Message text content
    pub body: String,
    /// Path to attached media; not owned or copied by the queue
    pub media_path: Option<String>,
    /// Channel-specific metadata, round-tripped verbatim
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    /// Create a new inbound message
    pub fn new(
        channel: impl Into<String>,
        account_id: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            account_id: account_id.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            body: body.into(),
            media_path: None,
            metadata: HashMap::new(),
        }
    }

    /// Get the unique session key for this message
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Attach a media path to the message
    pub fn with_media(mut self, path: impl Into<String>) -> Self {
        self.media_path = Some(path.into());
        self
    }

    /// Add metadata to the message
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
