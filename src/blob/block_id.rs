//! Block identifiers
//!
//! A block ID is the base64 encoding of `BlockId` followed by the block's
//! 1-based sequence index, zero-padded to seven digits. Every ID produced
//! for one blob therefore has the same encoded length, which the storage
//! service requires, and decodes back to its index.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Maximum number of committed blocks per blob
pub const MAX_BLOCKS: u64 = 50_000;

const PREFIX: &str = "BlockId";
const INDEX_WIDTH: usize = 7;

/// Errors from decoding an encoded block ID
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockIdError {
    #[error("block ID is empty")]
    Empty,

    #[error("block ID is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("block ID has unexpected format: {0}")]
    InvalidFormat(String),
}

/// Opaque block identifier derived from a chunk's sequence index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    sequence: u64,
    encoded: String,
}

impl BlockId {
    /// Build the identifier for the chunk at `sequence` (1-based)
    pub fn new(sequence: u64) -> Self {
        let raw = format!("{}{:0width$}", PREFIX, sequence, width = INDEX_WIDTH);
        Self {
            sequence,
            encoded: STANDARD.encode(raw),
        }
    }

    /// Decode an identifier previously produced by [`BlockId::new`]
    pub fn parse(encoded: &str) -> Result<Self, BlockIdError> {
        if encoded.is_empty() {
            return Err(BlockIdError::Empty);
        }

        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| BlockIdError::InvalidEncoding(e.to_string()))?;
        let raw = String::from_utf8(raw)
            .map_err(|_| BlockIdError::InvalidFormat(encoded.to_string()))?;

        let digits = raw
            .strip_prefix(PREFIX)
            .filter(|d| d.len() >= INDEX_WIDTH && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| BlockIdError::InvalidFormat(raw.clone()))?;
        let sequence = digits
            .parse::<u64>()
            .map_err(|_| BlockIdError::InvalidFormat(raw.clone()))?;

        Ok(Self::new(sequence))
    }

    /// Sequence index this identifier was built from
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Encoded form sent on the wire
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl Ord for BlockId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for BlockId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        // base64("BlockId0000001")
        assert_eq!(BlockId::new(1).as_str(), "QmxvY2tJZDAwMDAwMDE=");
    }

    #[test]
    fn test_ids_share_length() {
        let first = BlockId::new(1);
        let last = BlockId::new(MAX_BLOCKS);
        assert_eq!(first.as_str().len(), last.as_str().len());
    }

    #[test]
    fn test_parse_recovers_sequence() {
        for seq in [1, 2, 9, 10, 999, 50_000] {
            let id = BlockId::new(seq);
            let parsed = BlockId::parse(id.as_str()).unwrap();
            assert_eq!(parsed.sequence(), seq);
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn test_order_follows_sequence() {
        let mut ids: Vec<BlockId> = [12, 3, 7, 1, 100].into_iter().map(BlockId::new).collect();
        ids.sort();
        let seqs: Vec<u64> = ids.iter().map(BlockId::sequence).collect();
        assert_eq!(seqs, vec![1, 3, 7, 12, 100]);
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: std::collections::HashSet<String> =
            (1..=2000).map(|i| BlockId::new(i).as_str().to_string()).collect();
        assert_eq!(ids.len(), 2000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(BlockId::parse(""), Err(BlockIdError::Empty));
        assert!(matches!(
            BlockId::parse("not base64!"),
            Err(BlockIdError::InvalidEncoding(_))
        ));
        // base64("block-id-1")
        assert!(matches!(
            BlockId::parse("YmxvY2staWQtMQ=="),
            Err(BlockIdError::InvalidFormat(_))
        ));
    }
}
