//! panlink
//!
//! Chunked uploads, link-resolved downloads and directory listings against
//! the xpan object store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use panlink_engine::{Operate, PanConfig, TransferContext, TransferEvent, UploadOptions};
use panlink_transfer::ThroughputMeter;
use panlink_xpan::Client;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Move files to and from the xpan object store
#[derive(Parser)]
#[command(name = "panlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: ~/.config/panlink/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shards uploaded in parallel
    #[arg(short = 'j', long, default_value_t = 1)]
    concurrency: usize,

    /// Operation to run; defaults to the configured `operate`
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file
    Upload {
        /// Local file (default: `local_path` from the config)
        local: Option<PathBuf>,
        /// Remote path (default: `remote_path` from the config)
        remote: Option<String>,
    },

    /// Download a remote file
    Download {
        /// Remote path (default: `remote_path` from the config)
        remote: Option<String>,
        /// Local destination (default: `local_path` from the config)
        local: Option<PathBuf>,
    },

    /// List one page of a remote directory
    Ls {
        /// Remote directory (default: `dir` from the config)
        dir: Option<String>,
        /// Rows to return, 1 to 1000
        #[arg(short, long)]
        limit: Option<u32>,
        /// Row offset
        #[arg(short, long, default_value_t = 0)]
        start: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(PanConfig::default_path);
    let config = PanConfig::load(&config_path)?;

    init_logging(cli.verbose, &config.log_path)?;

    let command = cli.command.unwrap_or_else(|| match config.operate {
        Operate::UploadFile => Command::Upload {
            local: None,
            remote: None,
        },
        Operate::DownloadFile => Command::Download {
            remote: None,
            local: None,
        },
        Operate::QueryDir => Command::Ls {
            dir: None,
            limit: None,
            start: 0,
        },
    });

    let client = Client::new().context("failed to build HTTP client")?;
    let (tx, rx) = mpsc::channel(64);
    let ctx = TransferContext::from_client(client)
        .with_upload_options(UploadOptions {
            concurrency: cli.concurrency.max(1),
        })
        .with_events(tx);
    let reporter = tokio::spawn(report_progress(rx));

    match command {
        Command::Upload { local, remote } => {
            let target = config.upload_target(local, remote)?;
            let committed = ctx.upload_with_config(Some(target)).await?;
            println!(
                "uploaded {} ({} bytes, fs_id {}, md5 {})",
                committed.path, committed.size, committed.fs_id, committed.md5
            );
        }
        Command::Download { remote, local } => {
            let target = config.download_target(local, remote)?;
            let dest = target.local_path.clone();
            let bytes = ctx.download_with_config(Some(target)).await?;
            println!("downloaded {bytes} bytes to {}", dest.display());
        }
        Command::Ls { dir, limit, start } => {
            let query = config.list_query(dir, limit)?.with_start(start);
            let entries = ctx.list_directory(&query).await?;
            for entry in &entries {
                let kind = if entry.is_dir { "d" } else { "-" };
                println!("{kind} {:>12} {}", entry.size, entry.path);
            }
            println!("{} entries", entries.len());
        }
    }

    drop(ctx);
    let _ = reporter.await;
    Ok(())
}

/// Console logging plus an optional plain-text log file.
fn init_logging(verbose: bool, log_path: &str) -> anyhow::Result<()> {
    let default_filter = if verbose { "info,panlink=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = if log_path.is_empty() {
        None
    } else {
        let file = open_log_file(Path::new(log_path))?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn open_log_file(path: &Path) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

async fn report_progress(mut rx: mpsc::Receiver<TransferEvent>) {
    let mut meter = ThroughputMeter::default();

    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Fingerprinted {
                remote_path,
                shards,
            } => {
                meter.restart();
                tracing::info!(remote = remote_path.as_str(), shards, "fingerprinted");
            }
            TransferEvent::ShardSent {
                remote_path,
                index,
                progress,
            } => {
                meter.observe(progress.transferred_bytes);
                let remaining = progress.total_bytes.saturating_sub(progress.transferred_bytes);
                tracing::info!(
                    remote = remote_path.as_str(),
                    index,
                    done = progress.completed_shards,
                    of = progress.total_shards,
                    percent = %format!("{:.1}", progress.fraction() * 100.0),
                    speed = %format_bytes(meter.bytes_per_second() as u64),
                    eta_secs = meter.eta(remaining).map(|d| d.as_secs()),
                    "shard sent"
                );
            }
            TransferEvent::SessionOpened { .. }
            | TransferEvent::Committed { .. }
            | TransferEvent::LinkResolved { .. }
            | TransferEvent::Downloaded { .. } => {
                tracing::debug!(?event, "transfer event");
            }
        }
    }
}

/// Human-readable byte count per second.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
