//! Chunk source
//!
//! Cuts a byte stream into fixed-size chunks. The stream is consumed as it
//! is read, so a source can only be walked once.

use super::UploadError;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A bounded slice of the source stream
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 1-based position in the stream
    pub sequence: u64,
    pub bytes: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Lazy, non-restartable sequence of chunks over a reader
pub struct ChunkSource<R> {
    reader: R,
    chunk_size: usize,
    next_sequence: u64,
    total_bytes: u64,
    exhausted: bool,
}

impl<R> ChunkSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Wrap `reader`; `chunk_size` must be positive
    pub fn new(reader: R, chunk_size: usize) -> Result<Self, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidArgument(
                "chunk size must be greater than 0".into(),
            ));
        }

        Ok(Self {
            reader,
            chunk_size,
            next_sequence: 1,
            total_bytes: 0,
            exhausted: false,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes handed out so far
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Read the next chunk; `Ok(None)` once the stream is exhausted.
    ///
    /// Only the last chunk may be shorter than the chunk size. After an
    /// error the source must not be polled again.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            match self.reader.read(&mut buf[filled..]).await {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            }
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        let chunk = Chunk {
            sequence: self.next_sequence,
            bytes: Bytes::from(buf),
        };
        self.next_sequence += 1;
        self.total_bytes += filled as u64;

        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(data: &[u8], chunk_size: usize) -> Vec<Chunk> {
        let mut source = ChunkSource::new(data, chunk_size).unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        assert_eq!(source.total_bytes(), data.len() as u64);
        chunks
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let result = ChunkSource::new(&b"abc"[..], 0);
        assert!(matches!(result, Err(UploadError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_empty_stream_yields_nothing() {
        assert!(collect(b"", 4).await.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_counts_and_last_length() {
        for len in [1usize, 3, 4, 5, 8, 9, 17] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let chunks = collect(&data, 4).await;

            assert_eq!(chunks.len(), len.div_ceil(4), "len={}", len);
            let expected_last = if len % 4 == 0 { 4 } else { len % 4 };
            assert_eq!(chunks.last().unwrap().len(), expected_last, "len={}", len);

            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.bytes.to_vec()).collect();
            assert_eq!(joined, data);
        }
    }

    #[tokio::test]
    async fn test_sequence_starts_at_one() {
        let chunks = collect(b"abcdefghij", 3).await;
        let seqs: Vec<u64> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_short_reads_are_coalesced() {
        let reader = tokio_test::io::Builder::new()
            .read(b"ab")
            .read(b"c")
            .read(b"defg")
            .build();
        let mut source = ChunkSource::new(reader, 5).unwrap();

        let first = source.next_chunk().await.unwrap().unwrap();
        assert_eq!(&first.bytes[..], b"abcde");
        let second = source.next_chunk().await.unwrap().unwrap();
        assert_eq!(&second.bytes[..], b"fg");
        assert!(source.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_error_is_returned() {
        let reader = tokio_test::io::Builder::new()
            .read(b"abcd")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "boom"))
            .build();
        let mut source = ChunkSource::new(reader, 4).unwrap();

        assert!(source.next_chunk().await.unwrap().is_some());
        let err = source.next_chunk().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(source.next_chunk().await.unwrap().is_none());
    }
}
