//! Offline queue service: wires queue, monitor, sync engine and gate

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{hours_to_ms, OfflineQueueConfig};
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe, ConnectivityState};
use crate::gate::IntakeGate;
use crate::queue::{MessageQueue, QueueStats};
use crate::sync::{Reinjector, SyncConfig, SyncEngine, SyncReport};

/// Aggregate view for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub stats: QueueStats,
    pub connectivity: ConnectivityState,
    pub syncing: bool,
    pub auto_sync: bool,
}

struct SyncListener {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

/// Running offline queue
///
/// Created by [`OfflineQueueService::start`]; the host routes every
/// inbound message through [`gate`](Self::gate) and exposes the operator
/// operations (status, sync, check, cleanup) through its own surface.
pub struct OfflineQueueService {
    config: OfflineQueueConfig,
    queue: Arc<MessageQueue>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
    gate: IntakeGate,
    listener: Mutex<Option<SyncListener>>,
}

impl OfflineQueueService {
    /// Open the queue and start monitoring
    ///
    /// With `auto_sync` enabled, every transition to online triggers a
    /// drain. The listener subscribes before the first probe, so a host
    /// that starts online drains any backlog left by a previous run.
    pub async fn start(
        config: OfflineQueueConfig,
        reinjector: Arc<dyn Reinjector>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> crate::Result<Self> {
        let queue = Arc::new(MessageQueue::open(config.resolved_db_path()).await?);
        let monitor = Arc::new(ConnectivityMonitor::new(probe, config.check_interval()));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&queue),
            Arc::clone(&monitor),
            reinjector,
            SyncConfig::from_config(&config),
        ));
        let gate = IntakeGate::new(
            Arc::clone(&queue),
            Arc::clone(&monitor),
            config.max_queue_size,
        );

        let listener = if config.auto_sync {
            Some(spawn_sync_listener(&monitor, Arc::clone(&engine)))
        } else {
            None
        };
        monitor.start();

        info!(
            "Offline queue started (db: {}, auto sync: {})",
            queue.path().display(),
            config.auto_sync
        );

        Ok(Self {
            config,
            queue,
            monitor,
            engine,
            gate,
            listener: Mutex::new(listener),
        })
    }

    pub fn gate(&self) -> &IntakeGate {
        &self.gate
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn config(&self) -> &OfflineQueueConfig {
        &self.config
    }

    /// Queue stats plus connectivity state
    pub async fn status(&self) -> crate::Result<StatusReport> {
        Ok(StatusReport {
            stats: self.queue.stats().await?,
            connectivity: self.monitor.state(),
            syncing: self.engine.is_syncing(),
            auto_sync: self.config.auto_sync,
        })
    }

    /// Drain now, regardless of auto-sync
    ///
    /// Shares the in-flight guard with automatic drains.
    pub async fn sync_now(&self) -> crate::Result<SyncReport> {
        self.engine.process_queue().await
    }

    /// Probe connectivity immediately
    pub async fn check_now(&self) -> ConnectivityState {
        self.monitor.check().await
    }

    /// Remove completed/failed messages older than `max_age_hours`
    pub async fn cleanup(&self, max_age_hours: u64) -> crate::Result<u64> {
        self.queue.cleanup(hours_to_ms(max_age_hours)).await
    }

    /// Stop the listener and the monitor, then close the queue
    ///
    /// A drain already in flight runs to completion before the queue is
    /// closed.
    pub async fn shutdown(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.token.cancel();
            if let Err(e) = listener.handle.await {
                warn!("Sync listener ended abnormally: {}", e);
            }
        }
        self.monitor.stop();
        self.queue.close().await;
        info!("Offline queue stopped");
    }
}

impl Drop for OfflineQueueService {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.token.cancel();
        }
    }
}

fn spawn_sync_listener(monitor: &ConnectivityMonitor, engine: Arc<SyncEngine>) -> SyncListener {
    let mut events = monitor.subscribe();
    let token = CancellationToken::new();
    let loop_token = token.clone();

    let handle = tokio::spawn(async move {
        loop {
            let went_online = tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(change) => change.went_online(),
                    // Missed transitions; a drain is harmless if nothing is pending
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Sync listener lagged, skipped {} event(s)", skipped);
                        true
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if !went_online {
                continue;
            }
            match engine.process_queue().await {
                Ok(report) if report.skipped => debug!("Auto sync skipped, drain in flight"),
                Ok(report) => debug!("Auto sync replayed {} message(s)", report.completed),
                Err(e) => error!("Auto sync failed: {}", e),
            }
        }
        debug!("Sync listener exited");
    });

    SyncListener { handle, token }
}
