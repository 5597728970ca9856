//! Intake routing for inbound messages

use std::sync::Arc;

use tracing::debug;

use crate::bus::InboundMessage;
use crate::connectivity::ConnectivityMonitor;
use crate::queue::{MessageQueue, QueuedMessage};

/// What the caller should do with an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeDecision {
    /// Online: process normally
    Proceed,
    /// Offline: the message was durably queued; skip normal processing
    Queued(QueuedMessage),
}

impl IntakeDecision {
    pub fn is_queued(&self) -> bool {
        matches!(self, IntakeDecision::Queued(_))
    }
}

/// Decides per inbound message whether to process it now or defer it
pub struct IntakeGate {
    queue: Arc<MessageQueue>,
    monitor: Arc<ConnectivityMonitor>,
    max_queue_size: u64,
}

impl IntakeGate {
    pub fn new(
        queue: Arc<MessageQueue>,
        monitor: Arc<ConnectivityMonitor>,
        max_queue_size: u64,
    ) -> Self {
        Self {
            queue,
            monitor,
            max_queue_size,
        }
    }

    /// Route one inbound message
    ///
    /// Anything but a confirmed online state defers the message. Storage
    /// errors are returned so the caller never loses a message silently.
    pub async fn intercept(&self, msg: &InboundMessage) -> crate::Result<IntakeDecision> {
        if self.monitor.is_online() {
            return Ok(IntakeDecision::Proceed);
        }

        let queued = self.queue.enqueue(msg).await?;
        self.queue.enforce_max_size(self.max_queue_size).await?;
        debug!(
            "Offline ({}), queued message {} from {}",
            self.monitor.state(),
            queued.id,
            msg.session_key()
        );
        Ok(IntakeDecision::Queued(queued))
    }
}
