//! Re-injection port into the host's message pipeline

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::InboundMessage;

/// Re-submits a previously queued message to the host's normal
/// (online) processing path
///
/// Errors are contained by the sync engine: the message is marked
/// failed and the drain moves on.
#[async_trait]
pub trait Reinjector: Send + Sync {
    async fn reinject(&self, message: InboundMessage) -> crate::Result<()>;
}

/// Callback form of [`Reinjector`], for hosts that wire a closure
pub type ReinjectCallback = Arc<
    dyn Fn(InboundMessage) -> Pin<Box<dyn Future<Output = crate::Result<()>> + Send>>
        + Send
        + Sync,
>;

#[async_trait]
impl Reinjector for ReinjectCallback {
    async fn reinject(&self, message: InboundMessage) -> crate::Result<()> {
        (self)(message).await
    }
}
