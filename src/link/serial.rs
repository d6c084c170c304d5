//! Serial-over-USB link implementation.
//!
//! Frames commands the way the printer family expects: a `~` prefix and a
//! CR/LF terminator, with responses accumulated until the `ok` marker
//! arrives. Timeouts and disconnects surface as [`LinkError`]; the caller
//! decides whether that is fatal to the operation in progress.

use super::{Link, LinkError, Response, Result, contains};
use crate::config::SerialConfig;
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::time::Duration;
use tokio::time::{Instant, timeout};

const CMD_PREFIX: &[u8] = b"~";
const CMD_TERMINATOR: &[u8] = b"\r\n";
const ACK_MARKER: &[u8] = b"ok";
const READ_BUF_SIZE: usize = 512;

pub struct SerialLink {
    port: SerialPort,
    read_timeout: Duration,
}

impl SerialLink {
    /// Open the configured port.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        tracing::info!(
            "Opening serial port {} at {} baud",
            config.port,
            config.baud
        );
        let port = SerialPort::open(&config.port, config.baud)?;
        Ok(Self {
            port,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        })
    }

    async fn write_all(&self, data: &[u8]) -> Result<()> {
        let n = self.port.write(data).await?;
        if n != data.len() {
            return Err(LinkError::Disconnected(format!(
                "partial write: {} of {} bytes",
                n,
                data.len()
            )));
        }
        Ok(())
    }

    async fn read_once(&self, deadline: Duration) -> Result<Vec<u8>> {
        let mut buf = [0u8; READ_BUF_SIZE];
        match timeout(deadline, self.port.read(&mut buf)).await {
            Ok(Ok(0)) => Err(LinkError::Disconnected("link closed".to_string())),
            Ok(Ok(n)) => Ok(buf[..n].to_vec()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(LinkError::Timeout(deadline)),
        }
    }
}

#[async_trait]
impl Link for SerialLink {
    async fn send(&mut self, cmd: &[u8], timeout: Duration) -> Result<Response> {
        let mut framed = Vec::with_capacity(cmd.len() + 3);
        framed.extend_from_slice(CMD_PREFIX);
        framed.extend_from_slice(cmd);
        framed.extend_from_slice(CMD_TERMINATOR);
        self.write_all(&framed).await?;

        let deadline = Instant::now() + timeout;
        let mut raw = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout(timeout));
            }
            raw.extend_from_slice(&self.read_once(remaining).await?);
            if contains(&raw, ACK_MARKER) {
                return Ok(Response { ok: true, raw });
            }
        }
    }

    async fn send_raw(&mut self, data: &[u8], expect_response: bool) -> Result<()> {
        self.write_all(data).await?;
        if expect_response {
            let _ = self.read_once(self.read_timeout).await?;
        }
        Ok(())
    }

    async fn read_raw(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.read_once(timeout).await
    }
}
