//! Keep-alive monitor.
//!
//! The printer drops the USB session if it hears nothing for a while, so
//! a background task issues a cheap status probe at a fixed interval for
//! the life of the connection. Each probe takes the link mutex like any
//! other command, so an upload session (which holds the lock for its
//! whole duration) naturally starves it until the transfer ends.

use crate::link::SharedLink;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const PROBE: &[u8] = b"M119";
const PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct KeepAliveMonitor {
    task: JoinHandle<()>,
}

impl KeepAliveMonitor {
    /// Spawn the monitor. It stops when the shutdown channel fires or the
    /// handle is dropped via [`KeepAliveMonitor::stop`].
    pub fn spawn(
        link: SharedLink,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick fires immediately; skip it so the hello
            // exchange settles before the first probe
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::debug!("keep-alive monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let mut guard = link.lock().await;
                        if let Err(e) = guard.send(PROBE, PROBE_TIMEOUT).await {
                            tracing::warn!("keep-alive probe failed: {}", e);
                        }
                    }
                }
            }
        });
        Self { task }
    }

    /// Cancel the monitor immediately.
    pub fn stop(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::shared;
    use crate::link::sim::SimLink;

    #[tokio::test]
    async fn test_probes_until_shutdown() {
        let sim = SimLink::new();
        let sim_state = sim.state();
        let link = shared(sim);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let monitor = KeepAliveMonitor::spawn(link, Duration::from_millis(5), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let probes = sim_state.lock().unwrap().sent.len();
        assert!(probes >= 2, "expected at least 2 probes, got {}", probes);
        assert!(
            sim_state
                .lock()
                .unwrap()
                .sent
                .iter()
                .all(|c| c == "M119")
        );

        shutdown_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_shutdown = sim_state.lock().unwrap().sent.len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sim_state.lock().unwrap().sent.len(), after_shutdown);

        monitor.stop();
    }

    #[tokio::test]
    async fn test_stop_aborts_promptly() {
        let sim = SimLink::new();
        let sim_state = sim.state();
        let link = shared(sim);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let monitor = KeepAliveMonitor::spawn(link, Duration::from_millis(5), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(15)).await;
        monitor.stop();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let count = sim_state.lock().unwrap().sent.len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sim_state.lock().unwrap().sent.len(), count);
    }
}
