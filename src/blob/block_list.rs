//! Block list wire payload
//!
//! The commit request body is an XML document listing one `<Latest>` element
//! per block, in logical order:
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?><BlockList><Latest>ID_1</Latest>...</BlockList>
//! ```

use super::block_id::{BlockId, BlockIdError};
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;
use thiserror::Error;

/// Block list encoding/decoding errors
#[derive(Error, Debug)]
pub enum BlockListError {
    #[error("Failed to encode block list: {0}")]
    Encode(String),

    #[error("Failed to decode block list: {0}")]
    Decode(String),

    #[error("Invalid block ID in block list: {0}")]
    InvalidBlockId(#[from] BlockIdError),
}

/// Ordered list of block IDs committed in one finalize request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    blocks: Vec<BlockId>,
}

#[derive(Deserialize)]
#[serde(rename = "BlockList")]
struct BlockListDocument {
    #[serde(rename = "Latest", default)]
    latest: Vec<String>,
}

impl BlockList {
    /// Wrap block IDs in the order they must be committed
    pub fn new(blocks: Vec<BlockId>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serialize to the commit request body
    pub fn to_xml(&self) -> Result<Vec<u8>, BlockListError> {
        let mut writer = Writer::new(Vec::new());

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| BlockListError::Encode(e.to_string()))?;

        writer
            .create_element("BlockList")
            .write_inner_content(|w| {
                for block in &self.blocks {
                    w.create_element("Latest")
                        .write_text_content(BytesText::new(block.as_str()))?;
                }
                Ok(())
            })
            .map_err(|e| BlockListError::Encode(e.to_string()))?;

        Ok(writer.into_inner())
    }

    /// Parse a commit request body back into block IDs
    pub fn from_xml(xml: &str) -> Result<Self, BlockListError> {
        let document: BlockListDocument =
            quick_xml::de::from_str(xml).map_err(|e| BlockListError::Decode(e.to_string()))?;

        let blocks = document
            .latest
            .iter()
            .map(|encoded| BlockId::parse(encoded.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { blocks })
    }
}

impl FromIterator<BlockId> for BlockList {
    fn from_iter<I: IntoIterator<Item = BlockId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
