//! Chunked file upload to the printer's internal storage.
//!
//! The transfer is one atomic protocol sequence (transfer-start, raw
//! chunks, transfer-end, file-select) and must not be interleaved with
//! other traffic, so the session takes the link mutex once and holds the
//! guard for its whole duration. The guard is dropped on every exit path
//! before the lifecycle callback fires. No step retries; the first
//! failure aborts the session.

use crate::link::{Link, SharedLink, contains};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Fixed chunk size of the wire protocol.
pub const CHUNK_SIZE: usize = 1024;
/// Fixed destination directory on the device.
pub const REMOTE_DIR: &str = "0:/user";
/// Priority handed to the succeeded/failed callbacks.
const UPLOAD_PRIORITY: u8 = 10;

const COMMAND_TIMEOUT: Duration = Duration::from_millis(2000);
const START_ACK_TIMEOUT: Duration = Duration::from_millis(5000);
const END_ACK_TIMEOUT: Duration = Duration::from_millis(10000);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1000);

const FAILURE_MARKER: &[u8] = b"failed";
const START_ECHO: &[u8] = b"CMD M28";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file transfer not started")]
    NotStarted,
    #[error("file transfer interrupted")]
    Interrupted,
    #[error("file transfer incomplete")]
    Incomplete,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session status, advanced strictly in order; `Succeeded`/`Failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    HeatersOff,
    TransferStarting,
    Transferring,
    Finalizing,
    Succeeded,
    Failed,
}

/// Lifecycle callbacks exposed to the host. The succeeded/failed pair is
/// invoked exactly once per session, after link exclusivity has been
/// released.
pub trait UploadEvents: Send + Sync {
    fn upload_started(&self, filename: &str, remote_name: &str);
    fn upload_succeeded(&self, filename: &str, remote_name: &str, priority: u8);
    fn upload_failed(&self, filename: &str, remote_name: &str, priority: u8);
}

/// Handle to an in-flight session.
pub struct UploadHandle {
    remote_name: String,
    percent: Arc<AtomicU8>,
    status: watch::Receiver<UploadStatus>,
    task: JoinHandle<()>,
}

impl UploadHandle {
    /// Name chosen on the device. Always identical to the local filename:
    /// the protocol offers no directory listing, so collisions with
    /// pre-existing files are possible and unresolved.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// Progress as `100 * bytes_sent / total_size`, monotonically
    /// non-decreasing, 100 only after the final chunk.
    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> UploadStatus {
        *self.status.borrow()
    }

    /// Wait for the session to finish and return the terminal status.
    pub async fn wait(self) -> UploadStatus {
        let _ = self.task.await;
        *self.status.borrow()
    }
}

/// Start uploading a file to device storage. Returns as soon as the file
/// is read and the started callback has fired; the transfer itself runs
/// as a background task.
pub async fn begin_upload(
    link: SharedLink,
    path: impl AsRef<Path>,
    filename: &str,
    events: Arc<dyn UploadEvents>,
) -> Result<UploadHandle, UploadError> {
    let payload = tokio::fs::read(path.as_ref()).await?;
    let remote_name = filename.to_string();

    tracing::info!(
        "Starting storage upload of {} ({} bytes) as {}",
        filename,
        payload.len(),
        remote_name
    );
    events.upload_started(filename, &remote_name);

    let (status_tx, status_rx) = watch::channel(UploadStatus::Idle);
    let percent = Arc::new(AtomicU8::new(0));

    let task = tokio::spawn(run_session(
        link,
        payload,
        filename.to_string(),
        remote_name.clone(),
        events,
        status_tx,
        percent.clone(),
    ));

    Ok(UploadHandle {
        remote_name,
        percent,
        status: status_rx,
        task,
    })
}

async fn run_session(
    link: SharedLink,
    payload: Vec<u8>,
    filename: String,
    remote_name: String,
    events: Arc<dyn UploadEvents>,
    status: watch::Sender<UploadStatus>,
    percent: Arc<AtomicU8>,
) {
    let result = {
        // Exclusive link ownership for the whole protocol sequence. The
        // guard lives only in this block, so it is released on every exit
        // path before any callback fires.
        let mut guard = link.lock().await;
        transfer(&mut **guard, &payload, &remote_name, &status, &percent).await
    };

    match result {
        Ok(()) => {
            status.send_replace(UploadStatus::Succeeded);
            events.upload_succeeded(&filename, &remote_name, UPLOAD_PRIORITY);
            // Selecting the file also starts printing it; no separate
            // print-start command exists.
            let select = format!("M23 {}/{}", REMOTE_DIR, remote_name);
            let mut guard = link.lock().await;
            if let Err(e) = guard.send(select.as_bytes(), COMMAND_TIMEOUT).await {
                tracing::warn!("file select after upload failed: {}", e);
            }
        }
        Err(e) => {
            tracing::info!("Upload failed: {}", e);
            status.send_replace(UploadStatus::Failed);
            events.upload_failed(&filename, &remote_name, UPLOAD_PRIORITY);
        }
    }
}

/// The transfer protocol proper, strictly sequential, no steps skipped or
/// reordered.
async fn transfer(
    link: &mut dyn Link,
    payload: &[u8],
    remote_name: &str,
    status: &watch::Sender<UploadStatus>,
    percent: &AtomicU8,
) -> Result<(), UploadError> {
    // Heaters off first, best-effort: a failure here does not stop the
    // transfer from starting.
    status.send_replace(UploadStatus::HeatersOff);
    for cmd in ["M104 S0 T0", "M104 S0 T1", "M140 S0"] {
        if let Err(e) = link.send(cmd.as_bytes(), COMMAND_TIMEOUT).await {
            tracing::warn!("heater-off command {} failed: {}", cmd, e);
        }
    }

    status.send_replace(UploadStatus::TransferStarting);
    let total = payload.len();
    let start = format!("M28 {} {}/{}", total, REMOTE_DIR, remote_name);
    match link.send(start.as_bytes(), START_ACK_TIMEOUT).await {
        Ok(resp) if resp.ok => {}
        Ok(resp) => {
            tracing::debug!(
                "transfer-start rejected: {}",
                String::from_utf8_lossy(&resp.raw)
            );
            return Err(UploadError::NotStarted);
        }
        Err(e) => {
            tracing::debug!("transfer-start failed: {}", e);
            return Err(UploadError::NotStarted);
        }
    }
    tracing::debug!("M28 file transfer started");

    // Stream fixed-size chunks; each write must succeed before the next
    // is attempted, and there is no per-chunk retry.
    status.send_replace(UploadStatus::Transferring);
    let mut sent = 0usize;
    for chunk in payload.chunks(CHUNK_SIZE) {
        link.send_raw(chunk, false)
            .await
            .map_err(|_| UploadError::Interrupted)?;
        sent += chunk.len();
        let pct = (100 * sent / total) as u8;
        percent.store(pct, Ordering::Relaxed);
        tracing::debug!("Sent {}% ({}/{} bytes)", pct, sent, total);
    }

    status.send_replace(UploadStatus::Finalizing);
    let resp = link
        .send(b"M29", END_ACK_TIMEOUT)
        .await
        .map_err(|_| UploadError::Incomplete)?;
    let mut raw = resp.raw;
    if resp.ok && contains(&raw, START_ECHO) {
        // The device is still draining transfer output; consume it.
        raw = link
            .read_raw(DRAIN_TIMEOUT)
            .await
            .map_err(|_| UploadError::Incomplete)?;
    }
    if resp.ok && !contains(&raw, FAILURE_MARKER) {
        Ok(())
    } else {
        Err(UploadError::Incomplete)
    }
}

/// Plain command send used by tests to prove the link is free again after
/// a session ends.
#[cfg(test)]
pub(crate) async fn send_plain(
    link: &SharedLink,
    cmd: &crate::gcode::Command,
) -> crate::link::Result<()> {
    let mut guard = link.lock().await;
    guard.send(cmd.line().as_bytes(), COMMAND_TIMEOUT).await?;
    Ok(())
}
