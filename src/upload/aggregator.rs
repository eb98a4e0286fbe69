//! Per-chunk outcome collection
//!
//! Workers report into a shared [`ErrorAggregator`]; the coordinator reads it
//! once every worker has finished.

use crate::blob::{BlobClientError, BlockId};
use parking_lot::Mutex;
use std::fmt;
use thiserror::Error;

/// Outcome of one dispatched block write
#[derive(Debug)]
pub struct ChunkResult {
    pub block_id: BlockId,
    pub bytes: usize,
    pub error: Option<BlobClientError>,
}

impl ChunkResult {
    pub fn success(block_id: BlockId, bytes: usize) -> Self {
        Self {
            block_id,
            bytes,
            error: None,
        }
    }

    pub fn failure(block_id: BlockId, bytes: usize, error: BlobClientError) -> Self {
        Self {
            block_id,
            bytes,
            error: Some(error),
        }
    }
}

/// A block that terminally failed
#[derive(Debug)]
pub struct ChunkFailure {
    pub block_id: BlockId,
    pub bytes: usize,
    pub error: BlobClientError,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}: {}", self.block_id.sequence(), self.error)
    }
}

/// Every failed block of one upload, in sequence order
#[derive(Error, Debug)]
#[error("{}", summarize(.failures))]
pub struct AggregateError {
    failures: Vec<ChunkFailure>,
}

fn summarize(failures: &[ChunkFailure]) -> String {
    let details = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "failed to upload: ({} error occurred) [{}]",
        failures.len(),
        details
    )
}

impl AggregateError {
    pub fn failures(&self) -> &[ChunkFailure] {
        &self.failures
    }

    /// Sequence indices of the failed blocks, ascending
    pub fn failed_sequences(&self) -> Vec<u64> {
        self.failures.iter().map(|f| f.block_id.sequence()).collect()
    }
}

#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    bytes_succeeded: u64,
    failures: Vec<ChunkFailure>,
}

/// Thread-safe collector of chunk results
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    inner: Mutex<Tally>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one worker's result
    pub fn record(&self, result: ChunkResult) {
        let mut tally = self.inner.lock();
        match result.error {
            None => {
                tally.succeeded += 1;
                tally.bytes_succeeded += result.bytes as u64;
            }
            Some(error) => tally.failures.push(ChunkFailure {
                block_id: result.block_id,
                bytes: result.bytes,
                error,
            }),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.inner.lock().failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.inner.lock().succeeded
    }

    pub fn bytes_succeeded(&self) -> u64 {
        self.inner.lock().bytes_succeeded
    }

    /// Drain the collected failures, sorted by sequence
    pub fn take_failures(&self) -> Vec<ChunkFailure> {
        let mut failures = std::mem::take(&mut self.inner.lock().failures);
        failures.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        failures
    }

    /// Aggregate error if any block failed
    pub fn take_error(&self) -> Option<AggregateError> {
        let failures = self.take_failures();
        if failures.is_empty() {
            None
        } else {
            Some(AggregateError { failures })
        }
    }
}
