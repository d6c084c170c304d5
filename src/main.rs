use clap::{Parser, Subcommand};
use flashbridge::config::Config;
use flashbridge::connection::Connection;
use flashbridge::gcode::Command;
use flashbridge::link::serial::SerialLink;
use flashbridge::upload::{UploadEvents, UploadStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "flashbridge", about = "Bridge Marlin-dialect hosts to FlashForge-family printers")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "flashbridge.toml")]
    config: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Bridge G-code lines from stdin to the printer
    Run,
    /// Upload a file to the printer's internal storage and start printing it
    Upload { path: PathBuf },
}

/// Upload lifecycle logging for the CLI; a host application would hook its
/// own bookkeeping in here.
struct LogEvents;

impl UploadEvents for LogEvents {
    fn upload_started(&self, filename: &str, remote_name: &str) {
        tracing::info!("Upload started: {} -> {}", filename, remote_name);
    }
    fn upload_succeeded(&self, filename: &str, remote_name: &str, _priority: u8) {
        tracing::info!("Upload succeeded: {} -> {}", filename, remote_name);
    }
    fn upload_failed(&self, filename: &str, remote_name: &str, _priority: u8) {
        tracing::error!("Upload failed: {} -> {}", filename, remote_name);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting flashbridge");
    let config = Config::load(&cli.config)?;
    config.validate()?;
    tracing::info!(
        "Printer port: {} @ {} baud",
        config.serial.port,
        config.serial.baud
    );

    let link = flashbridge::link::shared(SerialLink::open(&config.serial)?);
    let mut conn = Connection::establish(link, &config, Arc::new(LogEvents)).await?;

    match cli.command {
        Cmd::Run => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = conn.enqueue(Command::new(line.trim())).await {
                    tracing::error!("Command failed: {}", e);
                    break;
                }
            }
        }
        Cmd::Upload { path } => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or("upload path has no file name")?
                .to_string();
            let handle = conn.begin_upload(&path, &filename).await?;
            let status = handle.wait().await;
            if status != UploadStatus::Succeeded {
                conn.disconnect().await;
                return Err("upload failed".into());
            }
        }
    }

    conn.disconnect().await;
    Ok(())
}
