//! Adapter availability probing
//!
//! Each registered adapter gets one background task that periodically
//! attempts a single TCP connection to the adapter's host and records the
//! outcome in the adapter's shared `available` flag. The task is owned by
//! the registry entry through a [`ProbeHandle`] and stops when the entry is
//! removed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One-shot reachability check
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// Whether `host` accepted a connection. Exactly one attempt.
    async fn probe(&self, host: &str) -> bool;
}

/// Probe that opens (and immediately drops) a TCP connection
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl EndpointProbe for TcpProbe {
    async fn probe(&self, host: &str) -> bool {
        let target = host
            .strip_prefix("http://")
            .or_else(|| host.strip_prefix("https://"))
            .unwrap_or(host);

        match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(host = %host, error = %e, "Probe connection refused");
                false
            }
            Err(_) => {
                debug!(host = %host, timeout_ms = self.timeout.as_millis() as u64, "Probe timed out");
                false
            }
        }
    }
}

/// Owner handle of a running prober task
#[derive(Debug)]
pub struct ProbeHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    /// Cancel the prober and wait for it to exit.
    ///
    /// Once this returns the task will not write the availability flag again.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Prober task panicked");
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start probing `host` every `interval`, writing the result to `available`.
///
/// The first probe runs one interval after start: registration has just
/// proven the adapter reachable.
pub fn spawn_prober(
    host: String,
    available: Arc<AtomicBool>,
    probe: Arc<dyn EndpointProbe>,
    interval: Duration,
) -> ProbeHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let reachable = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                reachable = probe.probe(&host) => reachable,
            };

            if token.is_cancelled() {
                break;
            }

            let previous = available.swap(reachable, Ordering::AcqRel);
            if previous != reachable {
                if reachable {
                    info!(host = %host, "Adapter became available");
                } else {
                    warn!(host = %host, "Adapter became unavailable");
                }
            }
        }

        debug!(host = %host, "Prober stopped");
    });

    ProbeHandle {
        cancel,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Probe whose answer is flipped by the test
    struct SwitchProbe {
        reachable: AtomicBool,
        calls: AtomicUsize,
    }

    impl SwitchProbe {
        fn new(reachable: bool) -> Arc<Self> {
            Arc::new(Self {
                reachable: AtomicBool::new(reachable),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EndpointProbe for SwitchProbe {
        async fn probe(&self, _host: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reachable.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prober_tracks_reachability() {
        let probe = SwitchProbe::new(false);
        let available = Arc::new(AtomicBool::new(true));
        let handle = spawn_prober(
            "localhost:10000".to_string(),
            available.clone(),
            probe.clone(),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!available.load(Ordering::SeqCst));

        probe.reachable.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(available.load(Ordering::SeqCst));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_after_stop() {
        let probe = SwitchProbe::new(true);
        let available = Arc::new(AtomicBool::new(false));
        let handle = spawn_prober(
            "localhost:10000".to_string(),
            available.clone(),
            probe.clone(),
            Duration::from_secs(1),
        );

        handle.stop().await;
        let calls = probe.calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!available.load(Ordering::SeqCst));
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_prober() {
        let probe = SwitchProbe::new(true);
        let available = Arc::new(AtomicBool::new(false));
        let handle = spawn_prober(
            "localhost:10000".to_string(),
            available.clone(),
            probe.clone(),
            Duration::from_secs(1),
        );
        drop(handle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tcp_probe_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let probe = TcpProbe::new(Duration::from_secs(1));

        assert!(probe.probe(&addr).await);

        drop(listener);
        assert!(!probe.probe(&addr).await);
    }
}
