//! Single-block writer used by the worker pool

use super::BlockStore;
use crate::blob::{BlobClientError, BlockId};
use crate::metrics;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Writes one chunk as one block
pub struct BlockUploader<S> {
    store: Arc<S>,
}

impl<S> Clone for BlockUploader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: BlockStore> BlockUploader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Write `bytes` under `block_id`.
    ///
    /// Arguments are checked before any request is made. Retries of
    /// transient failures happen below this call.
    pub async fn upload(
        &self,
        block_id: &BlockId,
        bytes: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        if block_id.as_str().is_empty() {
            return Err(BlobClientError::InvalidArgument("missing block ID".into()));
        }
        if bytes.is_empty() {
            return Err(BlobClientError::InvalidArgument("missing block body".into()));
        }

        let len = bytes.len();
        let start = Instant::now();
        let result = self.store.put_block(block_id, bytes, cancel).await;

        match &result {
            Ok(()) => {
                metrics::record_block_success(len as u64);
                tracing::debug!(
                    sequence = block_id.sequence(),
                    bytes = len,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Block written"
                );
            }
            Err(BlobClientError::Cancelled) => {
                tracing::debug!(sequence = block_id.sequence(), "Block write cancelled");
            }
            Err(e) => {
                metrics::record_block_failure();
                tracing::warn!(
                    sequence = block_id.sequence(),
                    bytes = len,
                    error = %e,
                    "Block write failed"
                );
            }
        }

        result
    }
}
