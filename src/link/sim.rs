//! Scripted in-memory link, standing in for printer hardware in tests and
//! bench setups.

use super::{Link, LinkError, Response, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the simulated device has seen and everything it will say
/// next. Shared with the test through [`SimLink::state`] so traffic can be
/// inspected after a session finishes.
#[derive(Debug, Default)]
pub struct SimState {
    /// Framed commands received via `send`, in order.
    pub sent: Vec<String>,
    /// Raw payload writes received via `send_raw`, in order.
    pub raw_writes: Vec<Vec<u8>>,
    /// Scripted responses for `send`; when empty, a plain ok is returned.
    pub responses: VecDeque<Response>,
    /// Scripted payloads for `read_raw`; empty means a timeout.
    pub raw_reads: VecDeque<Vec<u8>>,
    /// Fail the Nth raw write (0-based) with a disconnect.
    pub fail_raw_write_at: Option<usize>,
}

#[derive(Clone, Default)]
pub struct SimLink {
    state: Arc<Mutex<SimState>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for scripting responses and inspecting recorded traffic.
    pub fn state(&self) -> Arc<Mutex<SimState>> {
        self.state.clone()
    }

    /// Queue a scripted response for the next `send`.
    pub fn push_response(&self, ok: bool, raw: &[u8]) {
        self.state.lock().unwrap().responses.push_back(Response {
            ok,
            raw: raw.to_vec(),
        });
    }
}

#[async_trait]
impl Link for SimLink {
    async fn send(&mut self, cmd: &[u8], _timeout: Duration) -> Result<Response> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(String::from_utf8_lossy(cmd).to_string());
        Ok(state.responses.pop_front().unwrap_or(Response {
            ok: true,
            raw: b"ok".to_vec(),
        }))
    }

    async fn send_raw(&mut self, data: &[u8], _expect_response: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_raw_write_at == Some(state.raw_writes.len()) {
            return Err(LinkError::Disconnected("simulated write failure".to_string()));
        }
        state.raw_writes.push(data.to_vec());
        Ok(())
    }

    async fn read_raw(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state
            .raw_reads
            .pop_front()
            .ok_or(LinkError::Timeout(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_scripts() {
        let mut link = SimLink::new();
        link.push_response(false, b"error");

        let resp = link.send(b"M28 100 0:/user/f.gx", Duration::from_secs(1)).await.unwrap();
        assert!(!resp.ok);

        let resp = link.send(b"M105", Duration::from_secs(1)).await.unwrap();
        assert!(resp.ok);

        link.send_raw(b"abc", false).await.unwrap();

        let state = link.state();
        let state = state.lock().unwrap();
        assert_eq!(state.sent, vec!["M28 100 0:/user/f.gx", "M105"]);
        assert_eq!(state.raw_writes, vec![b"abc".to_vec()]);
    }

    #[tokio::test]
    async fn test_scripted_write_failure() {
        let mut link = SimLink::new();
        link.state().lock().unwrap().fail_raw_write_at = Some(1);

        assert!(link.send_raw(b"one", false).await.is_ok());
        let err = link.send_raw(b"two", false).await.unwrap_err();
        assert!(matches!(err, LinkError::Disconnected(_)));
    }
}
