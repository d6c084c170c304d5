//! Abstract serial link to the printer.
//!
//! The bridge never touches the byte transport directly; everything goes
//! through the [`Link`] trait so tests can substitute a scripted
//! implementation. One physical link is shared by ordinary command
//! traffic, the keep-alive monitor and upload sessions, so the handle
//! handed around is a [`SharedLink`]: a single mutex, locked per command
//! by most callers and for the whole session by an upload.

pub mod serial;
pub mod sim;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Transport-level failure, distinct from protocol-level failure (which
/// shows up as a well-formed response without the ok marker).
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link timeout after {0:?}")]
    Timeout(Duration),
    #[error("link disconnected: {0}")]
    Disconnected(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Raw response to one command.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// The device acknowledged the command (response carries the ok
    /// marker). A well-formed negative response is not a `LinkError`.
    pub ok: bool,
    pub raw: Vec<u8>,
}

impl Response {
    /// Whether the raw response contains a byte pattern.
    pub fn contains(&self, needle: &[u8]) -> bool {
        contains(&self.raw, needle)
    }
}

pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// One logical serial link: framed command/response plus raw byte access
/// for file-transfer payloads.
#[async_trait]
pub trait Link: Send {
    /// Send one framed command and collect the response until the device
    /// acknowledges or the timeout elapses.
    async fn send(&mut self, cmd: &[u8], timeout: Duration) -> Result<Response>;

    /// Write raw bytes (a file-transfer chunk). The write must complete in
    /// full; a short write is a transport failure. When `expect_response`
    /// is set a single response read is performed and discarded.
    async fn send_raw(&mut self, data: &[u8], expect_response: bool) -> Result<()>;

    /// One raw read, for draining output the device is still flushing.
    async fn read_raw(&mut self, timeout: Duration) -> Result<Vec<u8>>;
}

/// The single mutual-exclusion primitive guarding the transport.
pub type SharedLink = Arc<Mutex<Box<dyn Link>>>;

/// Wrap a link for sharing between the connection, the keep-alive monitor
/// and upload sessions.
pub fn shared(link: impl Link + 'static) -> SharedLink {
    Arc::new(Mutex::new(Box::new(link)))
}
