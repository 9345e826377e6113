//! Heartbeat driver sending periodic liveness envelopes to every networked peer

use super::hub::RelayHub;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Background task sending one heartbeat round per interval.
///
/// A round is never interrupted: [`HeartbeatDriver::stop`] lets the
/// in-flight round finish and only cancels the sleep between rounds.
pub struct HeartbeatDriver {
    interval: Arc<Mutex<Duration>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatDriver {
    /// Start the driver; the first round goes out immediately
    pub fn spawn(hub: Arc<RelayHub>, interval: Duration) -> Self {
        let interval = Arc::new(Mutex::new(interval));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let shared = Arc::clone(&interval);
        let task = tokio::spawn(async move {
            let initial = *shared.lock();
            info!(interval = ?initial, "heartbeat driver started");
            loop {
                let delivered = hub.send_heartbeats().await;
                debug!(delivered, "heartbeat round");

                let wait = *shared.lock();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("heartbeat driver stopped");
        });

        Self {
            interval,
            shutdown,
            task,
        }
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Change the interval; applies from the next sleep
    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock() = interval;
    }

    /// Stop after the current round and wait for the task to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "heartbeat task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::connection::test_support::channel_sink;
    use super::*;
    use crate::protocol::{decode_envelope, MessageType, RetCode};

    #[tokio::test]
    async fn test_rounds_until_stopped() {
        let hub = Arc::new(RelayHub::new());
        let (sink, mut rx) = channel_sink();
        let id = hub.connect(sink).await;
        rx.recv().await.unwrap(); // identity

        let driver = HeartbeatDriver::spawn(Arc::clone(&hub), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(70)).await;
        driver.stop().await;

        let mut beats = 0;
        while let Ok(frame) = rx.try_recv() {
            let envelope = decode_envelope(&frame).unwrap();
            assert_eq!(envelope.kind(), MessageType::Heartbeat);
            assert_eq!(envelope.client_id(), Some(id));
            assert_eq!(envelope.body().as_code(), Some(RetCode::Success));
            beats += 1;
        }
        assert!(beats >= 3, "only {} heartbeats", beats);

        // Nothing after stop
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_interval() {
        let hub = Arc::new(RelayHub::new());
        let driver = HeartbeatDriver::spawn(hub, Duration::from_secs(60));

        driver.set_interval(Duration::from_secs(5));
        assert_eq!(driver.interval(), Duration::from_secs(5));
        driver.stop().await;
    }
}
