//! Client liveness prober.
//!
//! Pings the client on a fixed interval while the session is active. A failed
//! probe cancels the session token, which the router observes and tears down.
//! The prober never waits for the client sink: a tick that finds it locked is
//! skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::base::DownstreamSink;

/// Default interval between probes
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared handle to the client sink; the router and the prober both write to it.
pub type SharedDownstream = Arc<Mutex<Box<dyn DownstreamSink>>>;

/// Background task probing the client connection.
pub struct LivenessProber {
    handle: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl LivenessProber {
    /// Start probing `downstream` every `interval`.
    ///
    /// The task stops when `session` is cancelled, and cancels it itself on a
    /// failed probe.
    pub fn spawn(
        downstream: SharedDownstream,
        interval: Duration,
        session: CancellationToken,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let task_alive = alive.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = session.cancelled() => {
                        debug!("Liveness prober cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Locked means the router is writing to the client
                        let Ok(mut sink) = downstream.try_lock() else {
                            debug!("Client sink busy, skipping probe");
                            continue;
                        };
                        if !sink.is_open() {
                            continue;
                        }
                        if let Err(e) = sink.ping().await {
                            info!("Client connection lost during ping: {}", e);
                            task_alive.store(false, Ordering::SeqCst);
                            session.cancel();
                            break;
                        }
                    }
                }
            }
        });

        Self { handle, alive }
    }

    /// False once a probe has failed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Wait for the task to finish, aborting it after `timeout`.
    ///
    /// The session token must already be cancelled.
    pub async fn join(self, timeout: Duration) {
        let mut handle = self.handle;
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            warn!("Liveness prober did not stop within {:?}, aborting", timeout);
            handle.abort();
        }
    }
}
