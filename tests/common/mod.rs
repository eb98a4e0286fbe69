//! Shared test infrastructure
//!
//! - In-memory block store with injectable latency, failures and hangs
//! - Reader wrapper that counts consumed bytes
//! - Test payload generation

#![allow(dead_code)]

use async_trait::async_trait;
use blockblob_uploadr::blob::{BlobClientError, BlockId, BlockList};
use blockblob_uploadr::upload::BlockStore;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

/// In-memory block store
#[derive(Default)]
pub struct MemoryStore {
    max_latency_ms: u64,
    fail: HashSet<u64>,
    hang: bool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub attempts: AtomicUsize,
    pub blocks: Mutex<BTreeMap<u64, Bytes>>,
    pub completion_order: Mutex<Vec<u64>>,
    pub commits: Mutex<Vec<BlockList>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every block write by a random 0..=`max_ms` milliseconds
    pub fn with_random_latency(mut self, max_ms: u64) -> Self {
        self.max_latency_ms = max_ms;
        self
    }

    /// Reject writes of these sequence indices with a 500
    pub fn failing<I: IntoIterator<Item = u64>>(mut self, sequences: I) -> Self {
        self.fail = sequences.into_iter().collect();
        self
    }

    /// Block writes never finish until cancelled
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().len()
    }

    /// Sequence indices of the only commit
    pub fn committed_sequences(&self) -> Vec<u64> {
        let commits = self.commits.lock();
        assert_eq!(commits.len(), 1, "expected exactly one commit");
        commits[0].blocks().iter().map(BlockId::sequence).collect()
    }

    /// Concatenation of the committed blocks' bytes
    pub fn committed_content(&self) -> Vec<u8> {
        let blocks = self.blocks.lock();
        self.committed_sequences()
            .iter()
            .flat_map(|seq| blocks[seq].to_vec())
            .collect()
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn put_block(
        &self,
        block_id: &BlockId,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.write(block_id, body, cancel).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn put_block_list(
        &self,
        block_list: &BlockList,
        _cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        self.commits.lock().push(block_list.clone());
        Ok(())
    }
}

impl MemoryStore {
    async fn write(
        &self,
        block_id: &BlockId,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        let latency = if self.max_latency_ms > 0 {
            rand::rng().random_range(0..=self.max_latency_ms)
        } else {
            0
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(BlobClientError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(latency)) => {}
        }

        if self.hang {
            cancel.cancelled().await;
            return Err(BlobClientError::Cancelled);
        }

        if self.fail.contains(&block_id.sequence()) {
            return Err(BlobClientError::RemoteRejected {
                status: 500,
                code: Some("InternalError".into()),
                message: None,
            });
        }

        self.blocks.lock().insert(block_id.sequence(), body);
        self.completion_order.lock().push(block_id.sequence());
        Ok(())
    }
}

/// Reader that reports how many bytes were pulled from it
pub struct CountingReader<R> {
    inner: R,
    read: Arc<AtomicU64>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicU64>) {
        let read = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                read: Arc::clone(&read),
            },
            read,
        )
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let n = (buf.filled().len() - before) as u64;
            self.read.fetch_add(n, Ordering::SeqCst);
        }
        poll
    }
}

/// Deterministic payload where every byte depends on its offset
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}
