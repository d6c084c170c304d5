//! End-to-end bridge flow against the simulated link: establish, translate
//! ordinary traffic, run an upload session, and verify command traffic
//! resumes afterwards.

use flashbridge::config::Config;
use flashbridge::connection::Connection;
use flashbridge::gcode::Command;
use flashbridge::link::shared;
use flashbridge::link::sim::SimLink;
use flashbridge::upload::{UploadEvents, UploadStatus};
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CountingEvents {
    started: Mutex<u32>,
    succeeded: Mutex<u32>,
    failed: Mutex<u32>,
}

impl UploadEvents for CountingEvents {
    fn upload_started(&self, _: &str, _: &str) {
        *self.started.lock().unwrap() += 1;
    }
    fn upload_succeeded(&self, _: &str, _: &str, _: u8) {
        *self.succeeded.lock().unwrap() += 1;
    }
    fn upload_failed(&self, _: &str, _: &str, _: u8) {
        *self.failed.lock().unwrap() += 1;
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.serial.port = "sim".to_string();
    config.serial.keep_alive_interval_ms = 60_000;
    config
}

#[tokio::test]
async fn test_full_bridge_flow() {
    let sim = SimLink::new();
    let sim_state = sim.state();
    let link = shared(sim);
    let events = Arc::new(CountingEvents::default());

    let mut conn = Connection::establish(link, &test_config(), events.clone())
        .await
        .unwrap();

    // ordinary translated traffic before the upload
    conn.enqueue(Command::new("G28 X0 Y0")).await.unwrap();
    conn.enqueue(Command::new("M190 S60")).await.unwrap();
    conn.enqueue(Command::new("M110")).await.unwrap(); // suppressed

    // upload a small file and wait for the session to finish
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![0x42u8; 1500]).unwrap();
    file.flush().unwrap();

    let handle = conn.begin_upload(file.path(), "benchy.gx").await.unwrap();
    assert_eq!(handle.remote_name(), "benchy.gx");
    assert_eq!(handle.wait().await, UploadStatus::Succeeded);
    assert_eq!(handle_counts(&events), (1, 1, 0));

    // the session released the link; command traffic resumes
    conn.enqueue(Command::new("M105")).await.unwrap();

    let state = sim_state.lock().unwrap();
    assert_eq!(
        state.sent,
        vec![
            "M601 S0",
            "G28 X Y",
            "M7 S60",
            "M104 S0 T0",
            "M104 S0 T1",
            "M140 S0",
            "M28 1500 0:/user/benchy.gx",
            "M29",
            "M23 0:/user/benchy.gx",
            "M105",
        ]
    );
    let chunk_sizes: Vec<usize> = state.raw_writes.iter().map(|c| c.len()).collect();
    assert_eq!(chunk_sizes, vec![1024, 476]);
    drop(state);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_failed_upload_leaves_connection_usable() {
    let sim = SimLink::new();
    let sim_state = sim.state();
    sim_state.lock().unwrap().fail_raw_write_at = Some(0);
    let link = shared(sim);
    let events = Arc::new(CountingEvents::default());

    let mut conn = Connection::establish(link, &test_config(), events.clone())
        .await
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![0u8; 300]).unwrap();
    file.flush().unwrap();

    let handle = conn.begin_upload(file.path(), "benchy.gx").await.unwrap();
    assert_eq!(handle.wait().await, UploadStatus::Failed);
    assert_eq!(handle_counts(&events), (1, 0, 1));

    // no file-select, and the link is free for ordinary commands
    conn.enqueue(Command::new("M105")).await.unwrap();
    let state = sim_state.lock().unwrap();
    assert!(!state.sent.iter().any(|c| c.starts_with("M23")));
    assert_eq!(state.sent.last().map(String::as_str), Some("M105"));
    drop(state);

    conn.disconnect().await;
}

fn handle_counts(events: &CountingEvents) -> (u32, u32, u32) {
    (
        *events.started.lock().unwrap(),
        *events.succeeded.lock().unwrap(),
        *events.failed.lock().unwrap(),
    )
}
