//! Connection lifecycle: hello handshake, inline command translation,
//! upload hand-off and keep-alive supervision.

use crate::config::{Config, ConfigFlags};
use crate::gcode::{Command, translator};
use crate::keepalive::KeepAliveMonitor;
use crate::link::{LinkError, SharedLink};
use crate::state::ConnectionState;
use crate::upload::{self, UploadError, UploadEvents, UploadHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
}

/// One live connection to a printer.
///
/// Owns the connection state (no other task mutates it), the translator
/// flags snapshot, and the shutdown channel the keep-alive monitor
/// listens on. Ordinary commands lock the link per send; upload sessions
/// lock it for their whole duration.
pub struct Connection {
    link: SharedLink,
    state: ConnectionState,
    flags: ConfigFlags,
    cancelling: bool,
    command_timeout: Duration,
    events: Arc<dyn UploadEvents>,
    shutdown_tx: broadcast::Sender<()>,
    keepalive: Option<KeepAliveMonitor>,
}

impl Connection {
    /// Establish the connection: send the hello command once (it takes
    /// control of the printer over USB) and start the keep-alive monitor.
    pub async fn establish(
        link: SharedLink,
        config: &Config,
        events: Arc<dyn UploadEvents>,
    ) -> Result<Self, BridgeError> {
        let command_timeout = Duration::from_millis(config.serial.read_timeout_ms);

        {
            let mut guard = link.lock().await;
            let resp = guard
                .send(config.serial.hello_command.as_bytes(), command_timeout)
                .await?;
            tracing::debug!(
                "hello response: {}",
                String::from_utf8_lossy(&resp.raw).trim()
            );
        }
        tracing::info!("Connection established");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let keepalive = KeepAliveMonitor::spawn(
            link.clone(),
            Duration::from_millis(config.serial.keep_alive_interval_ms),
            shutdown_rx,
        );

        let mut state = ConnectionState::new();
        state.is_ready = true;

        Ok(Self {
            link,
            state,
            flags: config.flags(),
            cancelling: false,
            command_timeout,
            events,
            shutdown_tx,
            keepalive: Some(keepalive),
        })
    }

    /// Translate one queued host command and send whatever the rules
    /// produce. A suppressed command is a normal, silent outcome; a link
    /// failure is surfaced and aborts the remainder of the sequence.
    pub async fn enqueue(&mut self, cmd: Command) -> Result<(), BridgeError> {
        let out = translator::translate(&cmd, &mut self.state, &self.flags, self.cancelling);
        if out.is_empty() {
            return Ok(());
        }
        let mut guard = self.link.lock().await;
        for outgoing in &out {
            guard
                .send(outgoing.line().as_bytes(), self.command_timeout)
                .await?;
        }
        Ok(())
    }

    /// Start a chunked upload to device storage. The session claims the
    /// link for its duration; command traffic resumes when it ends.
    pub async fn begin_upload(
        &self,
        path: impl AsRef<Path>,
        filename: &str,
    ) -> Result<UploadHandle, BridgeError> {
        let handle =
            upload::begin_upload(self.link.clone(), path, filename, self.events.clone()).await?;
        Ok(handle)
    }

    /// Flag a host-side cancel in progress; read by the M26 cancel-alias
    /// rule.
    pub fn set_cancelling(&mut self, cancelling: bool) {
        self.cancelling = cancelling;
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Lifecycle updates to the activity flags (print started/finished,
    /// device busy). Only the connection owner calls this.
    pub fn state_mut(&mut self) -> &mut ConnectionState {
        &mut self.state
    }

    /// Tear down: cancel the keep-alive monitor and discard the state.
    pub async fn disconnect(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.stop();
        }
        tracing::info!("Disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::shared;
    use crate::link::sim::SimLink;

    struct NullEvents;
    impl UploadEvents for NullEvents {
        fn upload_started(&self, _: &str, _: &str) {}
        fn upload_succeeded(&self, _: &str, _: &str, _: u8) {}
        fn upload_failed(&self, _: &str, _: &str, _: u8) {}
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.serial.port = "sim".to_string();
        // long interval so keep-alive probes stay out of the traffic log
        config.serial.keep_alive_interval_ms = 60_000;
        config
    }

    #[tokio::test]
    async fn test_establish_sends_hello_once() {
        let sim = SimLink::new();
        let sim_state = sim.state();
        let link = shared(sim);

        let conn = Connection::establish(link, &test_config(), Arc::new(NullEvents))
            .await
            .unwrap();
        assert!(conn.state().is_ready);

        assert_eq!(sim_state.lock().unwrap().sent, vec!["M601 S0"]);
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn test_enqueue_translates_and_sends() {
        let sim = SimLink::new();
        let sim_state = sim.state();
        let link = shared(sim);

        let mut conn = Connection::establish(link, &test_config(), Arc::new(NullEvents))
            .await
            .unwrap();

        conn.enqueue(Command::new("M84")).await.unwrap();
        conn.enqueue(Command::new(";header noise")).await.unwrap();
        conn.enqueue(Command::new("M106 S0")).await.unwrap();

        assert_eq!(
            sim_state.lock().unwrap().sent,
            vec!["M601 S0", "M18", "M107"]
        );
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn test_enqueue_sends_synthesized_sequences_in_order() {
        let sim = SimLink::new();
        let sim_state = sim.state();
        let link = shared(sim);

        let mut config = test_config();
        config.profile.disable_g91 = true;
        let mut conn = Connection::establish(link, &config, Arc::new(NullEvents))
            .await
            .unwrap();

        conn.enqueue(Command::new("G28 X0 Y0")).await.unwrap();
        assert_eq!(
            sim_state.lock().unwrap().sent,
            vec!["M601 S0", "G28 X", "G28 Y"]
        );

        conn.enqueue(Command::new("G91")).await.unwrap();
        assert!(conn.state().relative_positioning_emulated);
        assert_eq!(
            sim_state.lock().unwrap().sent,
            vec!["M601 S0", "G28 X", "G28 Y", "G91", "M114"]
        );
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn test_cancelling_signal_reaches_rules() {
        let sim = SimLink::new();
        let sim_state = sim.state();
        let link = shared(sim);

        let mut conn = Connection::establish(link, &test_config(), Arc::new(NullEvents))
            .await
            .unwrap();

        conn.enqueue(Command::new("M26 S0")).await.unwrap();
        assert_eq!(sim_state.lock().unwrap().sent, vec!["M601 S0"]);

        conn.set_cancelling(true);
        conn.enqueue(Command::new("M26 S0")).await.unwrap();
        assert_eq!(sim_state.lock().unwrap().sent, vec!["M601 S0", "M26"]);
        conn.disconnect().await;
    }
}
