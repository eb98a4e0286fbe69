//! Upload coordinator
//!
//! One producer (the caller's task) reads chunks and feeds a bounded queue;
//! a fixed pool of workers drains it. The queue holds at most `workers` jobs,
//! so memory stays within `O(workers * chunk_size)` and the producer waits
//! whenever every worker is busy.
//!
//! The committed block list is the list of dispatched IDs, built by the
//! producer in sequence order. Completion order never feeds into it.
//!
//! ```text
//! Idle -> Dispatching -> Draining -> Committing -> Done
//!                                \-> Aborted (chunk failure, read error, cancellation)
//! ```

use super::aggregator::{ChunkResult, ErrorAggregator};
use super::chunk::ChunkSource;
use super::committer::BlockListCommitter;
use super::uploader::BlockUploader;
use super::{BlockStore, UploadError, UploadOutcome};
use crate::blob::{BlobClientError, BlockId, MAX_BLOCKS};
use crate::config::UploadConfig;
use crate::metrics;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Default chunk size (4MB)
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default number of concurrent block writes
pub const DEFAULT_WORKERS: usize = 4;

/// What happens to the rest of the upload after a block fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep dispatching and writing every block, then report all failures
    #[default]
    DrainAll,
    /// Stop dispatching and abort in-flight writes on the first failure
    FailFast,
}

/// How a source that yields no bytes is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyInputPolicy {
    /// Fail with [`UploadError::EmptyInput`] without any request
    #[default]
    Reject,
    /// Commit an empty block list, producing a zero-length blob
    CommitEmpty,
}

/// Upload tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub chunk_size: usize,
    pub workers: usize,
    pub failure_policy: FailurePolicy,
    pub empty_input: EmptyInputPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            failure_policy: FailurePolicy::default(),
            empty_input: EmptyInputPolicy::default(),
        }
    }
}

impl From<&UploadConfig> for UploadOptions {
    fn from(config: &UploadConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            workers: config.workers,
            failure_policy: config.failure_policy,
            empty_input: config.empty_input,
        }
    }
}

/// Lifecycle of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Dispatching,
    Draining,
    Committing,
    Done,
    Aborted,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct UploadJob {
    block_id: BlockId,
    bytes: Bytes,
}

enum DispatchStop {
    Read(io::Error),
    TooManyBlocks,
}

/// Runs uploads against one block store
pub struct UploadCoordinator<S> {
    store: Arc<S>,
    options: UploadOptions,
}

impl<S> UploadCoordinator<S>
where
    S: BlockStore + 'static,
{
    /// Create a coordinator; fails if `workers` or `chunk_size` is zero
    pub fn new(store: Arc<S>, options: UploadOptions) -> Result<Self, UploadError> {
        if options.workers == 0 {
            return Err(UploadError::InvalidArgument(
                "workers must be greater than 0".into(),
            ));
        }
        if options.chunk_size == 0 {
            return Err(UploadError::InvalidArgument(
                "chunk size must be greater than 0".into(),
            ));
        }

        Ok(Self { store, options })
    }

    /// Upload everything `reader` yields
    pub async fn upload<R>(
        &self,
        reader: R,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let source = ChunkSource::new(reader, self.options.chunk_size)?;
        self.run(source, cancel).await
    }

    /// Upload every chunk of `source`, then commit them in sequence order.
    ///
    /// Nothing is committed unless every block was written, so on any error
    /// the remote blob is left as it was.
    #[tracing::instrument(
        name = "upload.run",
        skip_all,
        fields(
            upload.workers = self.options.workers,
            upload.chunk_size = source.chunk_size(),
            upload.policy = ?self.options.failure_policy,
            upload.blocks = tracing::field::Empty,
            upload.bytes = tracing::field::Empty,
            upload.phase = tracing::field::Empty
        ),
        err
    )]
    pub async fn run<R>(
        &self,
        mut source: ChunkSource<R>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let start = Instant::now();
        let result = self.run_phases(&mut source, cancel).await;
        let duration = start.elapsed();

        let span = tracing::Span::current();
        match &result {
            Ok(outcome) => {
                span.record("upload.phase", UploadPhase::Done.as_str());
                span.record("upload.blocks", outcome.block_count);
                span.record("upload.bytes", outcome.total_bytes_uploaded);
                metrics::record_upload_success(outcome.total_bytes_uploaded);
                tracing::info!(
                    blocks = outcome.block_count,
                    bytes = outcome.total_bytes_uploaded,
                    duration_ms = duration.as_millis() as u64,
                    "Upload completed"
                );
            }
            Err(e) => {
                span.record("upload.phase", UploadPhase::Aborted.as_str());
                metrics::record_upload_failure(upload_error_kind(e));
                tracing::error!(
                    error = %e,
                    bytes_read = source.total_bytes(),
                    duration_ms = duration.as_millis() as u64,
                    "Upload aborted"
                );
            }
        }
        metrics::record_upload_duration(duration.as_secs_f64());

        result
    }

    async fn run_phases<R>(
        &self,
        source: &mut ChunkSource<R>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        trace_phase(UploadPhase::Idle);

        // Child token: cancelled by the caller, or by a worker under FailFast.
        let abort = cancel.child_token();
        let aggregator = Arc::new(ErrorAggregator::new());
        let (jobs_tx, jobs_rx) = mpsc::channel::<UploadJob>(self.options.workers);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let uploader = BlockUploader::new(Arc::clone(&self.store));
        let mut workers = JoinSet::new();
        for worker_id in 0..self.options.workers {
            workers.spawn(run_worker(
                worker_id,
                uploader.clone(),
                Arc::clone(&jobs_rx),
                Arc::clone(&aggregator),
                abort.clone(),
                self.options.failure_policy,
            ));
        }

        trace_phase(UploadPhase::Dispatching);
        let mut dispatched: Vec<BlockId> = Vec::new();
        let mut stop = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                next = source.next_chunk() => next,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Source read failed, draining queued blocks");
                    stop = Some(DispatchStop::Read(e));
                    break;
                }
            };

            if chunk.sequence > MAX_BLOCKS {
                abort.cancel();
                stop = Some(DispatchStop::TooManyBlocks);
                break;
            }

            let block_id = BlockId::new(chunk.sequence);
            let job = UploadJob {
                block_id: block_id.clone(),
                bytes: chunk.bytes,
            };

            let sent = tokio::select! {
                biased;
                _ = abort.cancelled() => false,
                sent = jobs_tx.send(job) => sent.is_ok(),
            };
            if !sent {
                break;
            }
            dispatched.push(block_id);
        }

        // Closing the queue lets workers finish what is already enqueued.
        drop(jobs_tx);

        trace_phase(UploadPhase::Draining);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        tracing::debug!(
            dispatched = dispatched.len(),
            blocks_written = aggregator.succeeded(),
            bytes_written = aggregator.bytes_succeeded(),
            failed = aggregator.has_failures(),
            "Workers drained"
        );

        if cancel.is_cancelled() {
            trace_phase(UploadPhase::Aborted);
            return Err(UploadError::Cancelled);
        }

        match stop {
            Some(DispatchStop::Read(source)) => {
                trace_phase(UploadPhase::Aborted);
                return Err(UploadError::Read {
                    source,
                    failures: aggregator.take_failures(),
                });
            }
            Some(DispatchStop::TooManyBlocks) => {
                trace_phase(UploadPhase::Aborted);
                return Err(UploadError::TooManyBlocks { limit: MAX_BLOCKS });
            }
            None => {}
        }

        if let Some(err) = aggregator.take_error() {
            trace_phase(UploadPhase::Aborted);
            return Err(err.into());
        }

        if dispatched.is_empty() && self.options.empty_input == EmptyInputPolicy::Reject {
            trace_phase(UploadPhase::Aborted);
            return Err(UploadError::EmptyInput);
        }

        debug_assert!(dispatched.windows(2).all(|w| w[0] < w[1]));

        trace_phase(UploadPhase::Committing);
        let committer = BlockListCommitter::new(Arc::clone(&self.store));
        committer
            .commit(&dispatched, cancel)
            .await
            .map_err(|e| match e {
                BlobClientError::Cancelled => UploadError::Cancelled,
                e => UploadError::Commit(e),
            })?;

        trace_phase(UploadPhase::Done);
        Ok(UploadOutcome {
            total_bytes_uploaded: source.total_bytes(),
            block_count: dispatched.len(),
        })
    }
}

async fn run_worker<S: BlockStore>(
    worker_id: usize,
    uploader: BlockUploader<S>,
    jobs: Arc<Mutex<mpsc::Receiver<UploadJob>>>,
    aggregator: Arc<ErrorAggregator>,
    abort: CancellationToken,
    policy: FailurePolicy,
) {
    loop {
        let job = {
            let mut jobs = jobs.lock().await;
            tokio::select! {
                biased;
                _ = abort.cancelled() => None,
                job = jobs.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        let len = job.bytes.len();
        match uploader.upload(&job.block_id, job.bytes, &abort).await {
            Ok(()) => aggregator.record(ChunkResult::success(job.block_id, len)),
            // Aborted, not failed: the upload is already being torn down.
            Err(BlobClientError::Cancelled) => break,
            Err(e) => {
                aggregator.record(ChunkResult::failure(job.block_id, len, e));
                if policy == FailurePolicy::FailFast && !abort.is_cancelled() {
                    tracing::warn!(worker = worker_id, "Block failed, aborting remaining blocks");
                    abort.cancel();
                }
            }
        }
    }

    tracing::trace!(worker = worker_id, "Worker finished");
}

fn trace_phase(phase: UploadPhase) {
    tracing::debug!(phase = %phase, "Upload phase");
}

fn upload_error_kind(err: &UploadError) -> &'static str {
    match err {
        UploadError::InvalidArgument(_) => "invalid_argument",
        UploadError::Read { .. } => "read",
        UploadError::ChunksFailed(_) => "chunks_failed",
        UploadError::Commit(_) => "commit",
        UploadError::Cancelled => "cancelled",
        UploadError::EmptyInput => "empty_input",
        UploadError::TooManyBlocks { .. } => "too_many_blocks",
    }
}
