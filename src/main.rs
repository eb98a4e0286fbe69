//! Blockblob Uploadr - upload a file as a block blob
//!
//! Splits the file into blocks, writes them concurrently and commits the
//! block list once every block succeeded.

use anyhow::Context;
use blockblob_uploadr::blob::{BlobClient, BlobClientConfig};
use blockblob_uploadr::config::Config;
use blockblob_uploadr::upload::{self, FailurePolicy, UploadOptions};
use blockblob_uploadr::{logging, metrics};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Blockblob Uploadr - concurrent chunked uploader for block blobs
#[derive(Parser, Debug)]
#[command(name = "blockblob-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to upload
    file: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target blob URL with write authorization (overrides target.url)
    #[arg(short, long, env = "UPLOAD_SAS_URL", hide_env_values = true)]
    url: Option<String>,

    /// Block size in bytes (overrides upload.chunk_size)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Concurrent block writes (overrides upload.workers)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Abort remaining blocks as soon as one fails
    #[arg(long)]
    fail_fast: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {:?}", path))?,
        None => Config::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(chunk_size) = args.chunk_size {
        config.upload.chunk_size = chunk_size;
    }
    if let Some(workers) = args.workers {
        config.upload.workers = workers;
    }
    if args.fail_fast {
        config.upload.failure_policy = FailurePolicy::FailFast;
    }
    if let Some(url) = &args.url {
        config.target.url = Some(url.clone());
    }
    config.validate()?;

    logging::init(&config.logging)?;
    info!("Starting Blockblob Uploadr v{}", blockblob_uploadr::VERSION);

    let url = config
        .target
        .url
        .clone()
        .context("no target URL: pass --url or set target.url")?;
    let client = BlobClient::new(BlobClientConfig::from_config(url, &config.client))?;
    info!(endpoint = %client.endpoint(), file = ?args.file, "Uploading");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling upload");
                cancel.cancel();
            }
        });
    }

    let result = upload::upload_file(
        Arc::new(client),
        &args.file,
        UploadOptions::from(&config.upload),
        &cancel,
    )
    .await;

    if args.print_metrics && config.metrics.enabled {
        eprintln!("{}", metrics::gather_text()?);
    }

    let outcome = result?;
    println!("{}", outcome.total_bytes_uploaded);
    Ok(())
}
