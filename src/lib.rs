//! Blockblob Uploadr Library
//!
//! Concurrent chunked uploader for block-based object storage.
//!
//! # Features
//!
//! - **Bounded Concurrency**: fixed worker pool fed through a bounded queue
//! - **All or Nothing**: the block list is committed only when every block landed
//! - **Ordered Commit**: committed order is the stream order, whatever order blocks finish in
//! - **Cancellable**: cancellation aborts in-flight requests and skips the commit
//!
//! # Example
//!
//! ```no_run
//! use blockblob_uploadr::blob::{BlobClient, BlobClientConfig};
//! use blockblob_uploadr::upload::{UploadCoordinator, UploadOptions};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BlobClient::new(BlobClientConfig::new("https://host/container/blob?sig=..."))?;
//!     let coordinator = UploadCoordinator::new(Arc::new(client), UploadOptions::default())?;
//!
//!     let file = tokio::fs::File::open("video.mp4").await?;
//!     let outcome = coordinator.upload(file, &CancellationToken::new()).await?;
//!     println!("{} bytes in {} blocks", outcome.total_bytes_uploaded, outcome.block_count);
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod upload;

// Re-export commonly used types
pub use blob::{BlobClient, BlobClientConfig, BlobClientError};
pub use config::Config;
pub use upload::{UploadCoordinator, UploadError, UploadOptions, UploadOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
