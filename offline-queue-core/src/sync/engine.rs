//! Batch replay of queued messages

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::InboundMessage;
use crate::config::OfflineQueueConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::queue::{MessageQueue, QueuedMessage};
use crate::sync::reinject::Reinjector;

/// Upper bound on a single re-injection call
pub const DEFAULT_REINJECT_TIMEOUT: Duration = Duration::from_secs(120);

/// Drain settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Messages fetched per batch
    pub batch_size: usize,
    /// Retention for completed/failed messages, applied before each drain
    pub max_age_ms: i64,
    pub reinject_timeout: Duration,
}

impl SyncConfig {
    pub fn from_config(config: &OfflineQueueConfig) -> Self {
        Self {
            batch_size: usize::try_from(config.sync_batch_size).unwrap_or(usize::MAX),
            max_age_ms: config.max_age_ms(),
            reinject_timeout: DEFAULT_REINJECT_TIMEOUT,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_config(&OfflineQueueConfig::default())
    }
}

/// Outcome of one `process_queue` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Messages that reached `completed` during this drain
    pub completed: u64,
    /// Messages marked `failed` during this drain
    pub failed: u64,
    /// Messages recovered from `processing` before draining
    pub recovered: u64,
    /// Finished messages removed by retention cleanup
    pub cleaned: u64,
    /// The drain stopped early because connectivity was lost
    pub interrupted: bool,
    /// Another drain was already in flight; nothing was done
    pub skipped: bool,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Releases the in-flight flag when the drain ends, including on error
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the queue through the re-injection port
///
/// At most one drain runs at a time; automatic (on reconnect) and manual
/// triggers share the same guard.
pub struct SyncEngine {
    queue: Arc<MessageQueue>,
    monitor: Arc<ConnectivityMonitor>,
    reinjector: Arc<dyn Reinjector>,
    config: SyncConfig,
    syncing: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<MessageQueue>,
        monitor: Arc<ConnectivityMonitor>,
        reinjector: Arc<dyn Reinjector>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            monitor,
            reinjector,
            config,
            syncing: AtomicBool::new(false),
        }
    }

    /// Whether a drain is currently in flight
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Replay pending messages oldest-first, in batches
    ///
    /// One message's failure never aborts the batch. After each batch the
    /// connectivity is re-probed and the drain stops if it has dropped,
    /// leaving the remaining messages pending. Storage faults abort the
    /// drain and are returned.
    pub async fn process_queue(&self) -> crate::Result<SyncReport> {
        let Some(_in_flight) = InFlight::acquire(&self.syncing) else {
            debug!("Sync already in progress, skipping");
            return Ok(SyncReport::skipped());
        };

        let mut report = SyncReport {
            recovered: self.queue.reset_processing().await?,
            cleaned: self.queue.cleanup(self.config.max_age_ms).await?,
            ..SyncReport::default()
        };

        loop {
            let batch = self.queue.get_pending(self.config.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            debug!("Replaying batch of {} message(s)", batch.len());

            for message in batch {
                if !self.queue.mark_processing(&message.id).await? {
                    continue;
                }

                match self.replay(&message).await {
                    Ok(()) => {
                        self.queue.mark_completed(&message.id).await?;
                        report.completed += 1;
                        debug!("Replayed message {}", message.id);
                    }
                    Err(e) => {
                        warn!(
                            "Replay of message {} ({}:{}) failed: {}",
                            message.id, message.channel, message.chat_id, e
                        );
                        self.queue.mark_failed(&message.id, &e.to_string()).await?;
                        report.failed += 1;
                    }
                }
            }

            if !self.monitor.check().await.is_online() {
                // A drain that already emptied the queue was not cut short
                if !self.queue.get_pending(1).await?.is_empty() {
                    warn!("Connectivity lost during sync, leaving remaining messages pending");
                    report.interrupted = true;
                }
                break;
            }
        }

        if report.completed > 0 || report.failed > 0 || report.interrupted {
            info!(
                "Sync finished: {} replayed, {} failed{}",
                report.completed,
                report.failed,
                if report.interrupted { " (interrupted)" } else { "" }
            );
        }
        Ok(report)
    }

    async fn replay(&self, message: &QueuedMessage) -> crate::Result<()> {
        let payload = replay_payload(message);
        match tokio::time::timeout(self.config.reinject_timeout, self.reinjector.reinject(payload))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(crate::Error::Reinjection(format!(
                "timed out after {}s",
                self.config.reinject_timeout.as_secs_f32()
            ))),
        }
    }
}

/// Routing fields plus metadata augmented with replay details
///
/// Caller-supplied keys always win over the added ones.
fn replay_payload(message: &QueuedMessage) -> InboundMessage {
    let mut payload = message.to_inbound();
    let queued_at = message
        .queued_at_utc()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    let replay_fields = [
        ("offline_queue_id", json!(message.id)),
        ("offline_queued_at", json!(queued_at)),
        ("offline_replayed_at", json!(Utc::now().to_rfc3339())),
        ("offline_attempts", json!(message.attempts.saturating_add(1))),
    ];
    for (key, value) in replay_fields {
        payload.metadata.entry(key.to_string()).or_insert(value);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityProbe;
    use crate::queue::MessageStatus;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct SwitchProbe {
        online: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConnectivityProbe for SwitchProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.online.load(Ordering::SeqCst)
        }

        fn target(&self) -> &str {
            "switch"
        }
    }

    /// Records replays; fails bodies listed in `fail`, can cut connectivity
    #[derive(Default)]
    struct RecordingReinjector {
        seen: Mutex<Vec<InboundMessage>>,
        fail: Vec<String>,
        delay: Option<Duration>,
        go_offline_after: Option<(usize, Arc<SwitchProbe>)>,
    }

    impl RecordingReinjector {
        fn bodies(&self) -> Vec<String> {
            self.seen.lock().iter().map(|m| m.body.clone()).collect()
        }
    }

    #[async_trait]
    impl Reinjector for RecordingReinjector {
        async fn reinject(&self, message: InboundMessage) -> crate::Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let body = message.body.clone();
            let seen = {
                let mut seen = self.seen.lock();
                seen.push(message);
                seen.len()
            };
            if let Some((after, probe)) = &self.go_offline_after {
                if seen >= *after {
                    probe.online.store(false, Ordering::SeqCst);
                }
            }
            if self.fail.contains(&body) {
                return Err(crate::Error::Reinjection(format!("rejected {}", body)));
            }
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        queue: Arc<MessageQueue>,
        probe: Arc<SwitchProbe>,
        monitor: Arc<ConnectivityMonitor>,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let queue = Arc::new(MessageQueue::open(dir.path().join("q.db")).await.unwrap());
            let probe = Arc::new(SwitchProbe {
                online: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            });
            let monitor = Arc::new(ConnectivityMonitor::new(
                probe.clone(),
                Duration::from_secs(60),
            ));
            Self {
                _dir: dir,
                queue,
                probe,
                monitor,
            }
        }

        fn engine(&self, reinjector: Arc<dyn Reinjector>, batch_size: usize) -> SyncEngine {
            SyncEngine::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.monitor),
                reinjector,
                SyncConfig {
                    batch_size,
                    ..SyncConfig::default()
                },
            )
        }

        async fn enqueue(&self, body: &str) -> QueuedMessage {
            self.queue
                .enqueue(&InboundMessage::new("telegram", "bot", "u1", "c1", body))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_drains_in_batches_fifo() {
        let h = Harness::new().await;
        for body in ["A", "B", "C"] {
            h.enqueue(body).await;
        }

        let reinjector = Arc::new(RecordingReinjector::default());
        let engine = h.engine(reinjector.clone(), 2);

        let report = engine.process_queue().await.unwrap();
        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.interrupted);
        assert_eq!(reinjector.bodies(), vec!["A", "B", "C"]);
        // One connectivity re-check per batch
        assert_eq!(h.probe.calls.load(Ordering::SeqCst), 2);

        let stats = h.queue.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.completed, 3);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_not_retried() {
        let h = Harness::new().await;
        h.enqueue("ok-1").await;
        let d = h.enqueue("D").await;
        h.enqueue("ok-2").await;

        let reinjector = Arc::new(RecordingReinjector {
            fail: vec!["D".to_string()],
            ..Default::default()
        });
        let engine = h.engine(reinjector.clone(), 10);

        let report = engine.process_queue().await.unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);

        let stored = h.queue.get(&d.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.unwrap().contains("rejected D"));
        assert!(h.queue.get_pending(10).await.unwrap().is_empty());

        let second = engine.process_queue().await.unwrap();
        assert_eq!(second.completed, 0);
        assert_eq!(second.failed, 0);
        assert_eq!(reinjector.bodies().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_skipped() {
        let h = Harness::new().await;
        h.enqueue("slow").await;

        let reinjector = Arc::new(RecordingReinjector {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let engine = Arc::new(h.engine(reinjector.clone(), 10));

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.process_queue().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.is_syncing());

        let second = engine.process_queue().await.unwrap();
        assert!(second.skipped);
        assert_eq!(second.completed, 0);

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.completed, 1);
        assert!(!engine.is_syncing());
        assert_eq!(reinjector.bodies(), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_stops_when_connectivity_drops() {
        let h = Harness::new().await;
        for body in ["1", "2", "3"] {
            h.enqueue(body).await;
        }

        let reinjector = Arc::new(RecordingReinjector {
            go_offline_after: Some((1, h.probe.clone())),
            ..Default::default()
        });
        let engine = h.engine(reinjector.clone(), 1);

        let report = engine.process_queue().await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.completed, 1);
        assert_eq!(reinjector.bodies(), vec!["1"]);

        let pending = h.queue.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|m| m.attempts == 0));
    }

    #[tokio::test]
    async fn test_connectivity_drop_after_last_message_is_not_interrupted() {
        let h = Harness::new().await;
        h.enqueue("only").await;

        let reinjector = Arc::new(RecordingReinjector {
            go_offline_after: Some((1, h.probe.clone())),
            ..Default::default()
        });
        let engine = h.engine(reinjector.clone(), 10);

        let report = engine.process_queue().await.unwrap();
        assert_eq!(report.completed, 1);
        assert!(!report.interrupted);
        assert!(h.queue.get_pending(10).await.unwrap().is_empty());
        assert!(!h.monitor.is_online());
    }

    #[tokio::test]
    async fn test_recovers_interrupted_messages() {
        let h = Harness::new().await;
        let stuck = h.enqueue("stuck").await;
        h.queue.mark_processing(&stuck.id).await.unwrap();

        let reinjector = Arc::new(RecordingReinjector::default());
        let engine = h.engine(reinjector.clone(), 10);

        let report = engine.process_queue().await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.completed, 1);

        let stored = h.queue.get(&stuck.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Completed);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn test_reinject_timeout_marks_failed() {
        let h = Harness::new().await;
        let msg = h.enqueue("hangs").await;

        let reinjector = Arc::new(RecordingReinjector {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let engine = SyncEngine::new(
            Arc::clone(&h.queue),
            Arc::clone(&h.monitor),
            reinjector,
            SyncConfig {
                batch_size: 10,
                reinject_timeout: Duration::from_millis(50),
                ..SyncConfig::default()
            },
        );

        let report = engine.process_queue().await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = h.queue.get(&msg.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert!(stored.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_replay_metadata_keeps_caller_keys() {
        let h = Harness::new().await;
        let queued = h
            .queue
            .enqueue(
                &InboundMessage::new("email", "inbox", "a@b.c", "t1", "hi")
                    .with_media("/var/media/1.png")
                    .with_metadata("thread", "t-9")
                    .with_metadata("offline_queue_id", "caller-owned"),
            )
            .await
            .unwrap();

        let reinjector = Arc::new(RecordingReinjector::default());
        h.engine(reinjector.clone(), 10)
            .process_queue()
            .await
            .unwrap();

        let seen = reinjector.seen.lock();
        let replayed = &seen[0];
        assert_eq!(replayed.channel, "email");
        assert_eq!(replayed.account_id, "inbox");
        assert_eq!(replayed.media_path.as_deref(), Some("/var/media/1.png"));
        assert_eq!(replayed.metadata["thread"], "t-9");
        assert_eq!(replayed.metadata["offline_queue_id"], "caller-owned");
        assert_eq!(replayed.metadata["offline_attempts"], 1);
        assert!(replayed.metadata.contains_key("offline_replayed_at"));
        assert_eq!(
            replayed.metadata["offline_queued_at"],
            queued.queued_at_utc().unwrap().to_rfc3339()
        );
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_no_op() {
        let h = Harness::new().await;
        let reinjector = Arc::new(RecordingReinjector::default());
        let report = h.engine(reinjector, 10).process_queue().await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(h.probe.calls.load(Ordering::SeqCst), 0);
    }
}
