//! Connectivity monitor service

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OfflineQueueConfig;
use crate::connectivity::probe::{ConnectivityProbe, HttpProbe};
use crate::connectivity::types::{ConnectivityState, StateChange};

const EVENT_CAPACITY: usize = 16;

/// Periodic reachability monitor
///
/// State starts as `Unknown` and is updated by every probe, periodic or
/// manual. Subscribers receive one [`StateChange`] per actual transition;
/// probes that confirm the current state are silent.
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<MonitorTask>>,
}

struct MonitorTask {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

struct MonitorInner {
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    state_tx: watch::Sender<ConnectivityState>,
    events: broadcast::Sender<StateChange>,
    /// Serializes state replacement with event emission
    transition: Mutex<()>,
}

impl ConnectivityMonitor {
    /// Create a monitor around an arbitrary probe
    pub fn new(probe: Arc<dyn ConnectivityProbe>, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState::Unknown);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(MonitorInner {
                probe,
                interval,
                state_tx,
                events,
                transition: Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Create a monitor probing the configured endpoint over HTTP
    pub fn from_config(config: &OfflineQueueConfig) -> crate::Result<Self> {
        Ok(Self::new(
            Arc::new(HttpProbe::new(config.check_url())?),
            config.check_interval(),
        ))
    }

    /// Start periodic probing; a no-op if already started
    ///
    /// The first probe runs immediately. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut slot = self.task.lock();
        if slot.is_some() {
            debug!("Connectivity monitor already running");
            return;
        }

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            inner.run_loop(loop_token).await;
        });

        *slot = Some(MonitorTask { handle, token });
        info!(
            "Connectivity monitor started (every {}s, probing {})",
            self.inner.interval.as_secs(),
            self.inner.probe.target()
        );
    }

    /// Stop periodic probing
    ///
    /// A probe already in flight finishes, but no new probe starts.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.token.cancel();
            drop(task.handle);
            info!("Connectivity monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Probe now, update state, and return it
    pub async fn check(&self) -> ConnectivityState {
        self.inner.check().await
    }

    /// Last known state
    pub fn state(&self) -> ConnectivityState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Wait until the state becomes online or `timeout` elapses
    ///
    /// Does not probe by itself; it relies on the periodic loop or on
    /// concurrent `check` calls to observe the transition.
    pub async fn wait_for_online(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.state_tx.subscribe();
        let result = tokio::time::timeout(timeout, rx.wait_for(|s| s.is_online())).await;
        matches!(result, Ok(Ok(_)))
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.events.subscribe()
    }

    /// Get monitor status
    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.state(),
            "running": self.is_running(),
            "intervalSec": self.inner.interval.as_secs(),
            "target": self.inner.probe.target(),
        })
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.token.cancel();
        }
    }
}

impl MonitorInner {
    async fn run_loop(&self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }

            self.check().await;

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        debug!("Connectivity probe loop exited");
    }

    async fn check(&self) -> ConnectivityState {
        let current = if self.probe.probe().await {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };

        let _guard = self.transition.lock();
        let previous = self.state_tx.send_replace(current);
        if previous != current {
            match current {
                ConnectivityState::Online => info!("Connectivity restored ({} -> online)", previous),
                _ => warn!("Connectivity lost ({} -> {})", previous, current),
            }
            // No subscribers is fine
            let _ = self.events.send(StateChange { previous, current });
        }

        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::broadcast::error::TryRecvError;

    struct ToggleProbe {
        online: AtomicBool,
        calls: AtomicUsize,
    }

    impl ToggleProbe {
        fn new(online: bool) -> Arc<Self> {
            Arc::new(Self {
                online: AtomicBool::new(online),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConnectivityProbe for ToggleProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.online.load(Ordering::SeqCst)
        }

        fn target(&self) -> &str {
            "toggle"
        }
    }

    #[tokio::test]
    async fn test_initial_state_unknown() {
        let monitor = ConnectivityMonitor::new(ToggleProbe::new(true), Duration::from_secs(30));
        assert_eq!(monitor.state(), ConnectivityState::Unknown);
        assert!(!monitor.is_online());
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_check_updates_state() {
        let probe = ToggleProbe::new(false);
        let monitor = ConnectivityMonitor::new(probe.clone(), Duration::from_secs(30));

        assert_eq!(monitor.check().await, ConnectivityState::Offline);
        probe.set(true);
        assert_eq!(monitor.check().await, ConnectivityState::Online);
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_one_event_per_transition() {
        let probe = ToggleProbe::new(true);
        let monitor = ConnectivityMonitor::new(probe.clone(), Duration::from_secs(30));
        let mut events = monitor.subscribe();

        for _ in 0..3 {
            monitor.check().await;
        }
        let first = events.try_recv().unwrap();
        assert!(first.went_online());
        assert_eq!(first.previous, ConnectivityState::Unknown);
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);

        probe.set(false);
        monitor.check().await;
        monitor.check().await;
        assert!(events.try_recv().unwrap().went_offline());
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);

        probe.set(true);
        monitor.check().await;
        assert!(events.try_recv().unwrap().went_online());
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_halts_probing() {
        let probe = ToggleProbe::new(true);
        let monitor = ConnectivityMonitor::new(probe.clone(), Duration::from_millis(20));

        monitor.start();
        monitor.start();
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(monitor.is_online());
        assert!(probe.calls() >= 2);

        monitor.stop();
        assert!(!monitor.is_running());
        // Let any in-flight iteration observe cancellation
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = probe.calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(probe.calls(), after_stop);
    }

    #[tokio::test]
    async fn test_wait_for_online_times_out() {
        let monitor = ConnectivityMonitor::new(ToggleProbe::new(false), Duration::from_secs(30));
        monitor.check().await;
        assert!(!monitor.wait_for_online(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_wait_for_online_sees_transition() {
        let probe = ToggleProbe::new(false);
        let monitor = Arc::new(ConnectivityMonitor::new(probe.clone(), Duration::from_secs(30)));
        monitor.check().await;

        let checker = Arc::clone(&monitor);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            probe.set(true);
            checker.check().await;
        });

        assert!(monitor.wait_for_online(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_for_online_returns_immediately_when_online() {
        let monitor = ConnectivityMonitor::new(ToggleProbe::new(true), Duration::from_secs(30));
        monitor.check().await;
        assert!(monitor.wait_for_online(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_status() {
        let monitor = ConnectivityMonitor::new(ToggleProbe::new(true), Duration::from_secs(45));
        let status = monitor.status();
        assert_eq!(status["state"], "unknown");
        assert_eq!(status["running"], false);
        assert_eq!(status["intervalSec"], 45);
        assert_eq!(status["target"], "toggle");
    }
}
