//! Block list commit
//!
//! A failed commit leaves the written blocks uncommitted on the service.
//! They are invisible to readers and expire on their own, so nothing is
//! cleaned up here.

use super::BlockStore;
use crate::blob::{BlobClientError, BlockId, BlockList};
use crate::metrics;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Issues the single finalize request of an upload
pub struct BlockListCommitter<S> {
    store: Arc<S>,
}

impl<S: BlockStore> BlockListCommitter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Commit `block_ids` in exactly the given order
    pub async fn commit(
        &self,
        block_ids: &[BlockId],
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        let block_list = BlockList::new(block_ids.to_vec());

        match self.store.put_block_list(&block_list, cancel).await {
            Ok(()) => {
                metrics::record_commit(true);
                tracing::info!(blocks = block_list.len(), "Block list committed");
                Ok(())
            }
            Err(e) => {
                metrics::record_commit(false);
                tracing::error!(
                    blocks = block_list.len(),
                    error = %e,
                    "Block list commit failed; written blocks remain uncommitted"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    struct ListStore {
        committed: Mutex<Option<BlockList>>,
        reject: bool,
    }

    #[async_trait]
    impl BlockStore for ListStore {
        async fn put_block(
            &self,
            _block_id: &BlockId,
            _body: Bytes,
            _cancel: &CancellationToken,
        ) -> Result<(), BlobClientError> {
            Ok(())
        }

        async fn put_block_list(
            &self,
            block_list: &BlockList,
            _cancel: &CancellationToken,
        ) -> Result<(), BlobClientError> {
            if self.reject {
                return Err(BlobClientError::RemoteRejected {
                    status: 400,
                    code: Some("InvalidBlockList".into()),
                    message: None,
                });
            }
            *self.committed.lock() = Some(block_list.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commit_keeps_order() {
        let store = Arc::new(ListStore {
            committed: Mutex::new(None),
            reject: false,
        });
        let committer = BlockListCommitter::new(Arc::clone(&store));
        let ids = vec![BlockId::new(1), BlockId::new(2), BlockId::new(3)];

        committer.commit(&ids, &CancellationToken::new()).await.unwrap();

        let committed = store.committed.lock().clone().unwrap();
        assert_eq!(committed.blocks(), &ids[..]);
    }

    #[tokio::test]
    async fn test_commit_failure_surfaces() {
        let store = Arc::new(ListStore {
            committed: Mutex::new(None),
            reject: true,
        });
        let committer = BlockListCommitter::new(store);

        let err = committer
            .commit(&[BlockId::new(1)], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}
