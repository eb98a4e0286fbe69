//! Upload module
//!
//! Concurrent chunked upload engine: the source stream is cut into chunks,
//! each chunk is written as an uncommitted block by a bounded worker pool,
//! and the ordered block list is committed only when every block succeeded.
//!
//! ```text
//! ChunkSource ──> UploadCoordinator ──(bounded queue)──> workers ──> BlockUploader
//!                        │                                  │
//!                        │                           ErrorAggregator
//!                        └── barrier ──> BlockListCommitter (all succeeded)
//! ```

use crate::blob::{BlobClientError, BlockId, BlockList};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod aggregator;
pub mod chunk;
pub mod committer;
pub mod coordinator;
pub mod uploader;

pub use aggregator::{AggregateError, ChunkFailure, ChunkResult, ErrorAggregator};
pub use chunk::{Chunk, ChunkSource};
pub use committer::BlockListCommitter;
pub use coordinator::{
    EmptyInputPolicy, FailurePolicy, UploadCoordinator, UploadOptions, UploadPhase,
};
pub use uploader::BlockUploader;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read source: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        /// Blocks that also failed before dispatch stopped
        failures: Vec<ChunkFailure>,
    },

    #[error(transparent)]
    ChunksFailed(#[from] AggregateError),

    #[error("Failed to put block list: {0}")]
    Commit(#[source] BlobClientError),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Source is empty, nothing to commit")]
    EmptyInput,

    #[error("Too many blocks: at most {limit} blocks per blob")]
    TooManyBlocks { limit: u64 },
}

/// Result of a committed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub total_bytes_uploaded: u64,
    pub block_count: usize,
}

/// Block-based object store the engine writes to
///
/// Implementations must make repeated writes of the same block ID with the
/// same bytes harmless, since the transport may retry a block.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Write one uncommitted block
    async fn put_block(
        &self,
        block_id: &BlockId,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError>;

    /// Atomically commit the listed blocks, in order
    async fn put_block_list(
        &self,
        block_list: &BlockList,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError>;
}

/// Upload a local file through `store`
pub async fn upload_file<S, P>(
    store: Arc<S>,
    path: P,
    options: UploadOptions,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, UploadError>
where
    S: BlockStore + 'static,
    P: AsRef<Path>,
{
    let coordinator = UploadCoordinator::new(store, options)?;
    let file = tokio::fs::File::open(path.as_ref())
        .await
        .map_err(|source| UploadError::Read {
            source,
            failures: Vec::new(),
        })?;

    tracing::debug!(path = %path.as_ref().display(), "Opened source file");
    coordinator.upload(file, cancel).await
}
