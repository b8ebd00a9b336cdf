use serde::{Deserialize, Serialize};

use crate::codec::CodecTag;
use crate::error::{Result, XbcfError};
use crate::header::MAX_TABLE_SIZE;

/// Default logical block size: 1 MiB.
pub const DEFAULT_BLOCK_SIZE:        u64 = 1024 * 1024;
/// Default number of offset table slots.
pub const DEFAULT_TABLE_SIZE:        u64 = 1024;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Parameters fixed when a container is opened for writing.
///
/// `block_size` only applies to leaf containers; node containers always
/// record 0.  `table_size` is an upper bound on the number of blocks (or
/// children) and cannot grow after open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    pub block_size:        u64,
    pub table_size:        u64,
    pub codec:             CodecTag,
    pub compression_level: i32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            block_size:        DEFAULT_BLOCK_SIZE,
            table_size:        DEFAULT_TABLE_SIZE,
            codec:             CodecTag::LZ4,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl WriteOptions {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| XbcfError::InvalidOptions(e.to_string()))
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_table_size(mut self, table_size: u64) -> Self {
        self.table_size = table_size;
        self
    }

    pub fn with_codec(mut self, codec: CodecTag) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub(crate) fn validate(&self, level: u64) -> Result<()> {
        if self.table_size == 0 || self.table_size > MAX_TABLE_SIZE {
            return Err(XbcfError::InvalidOptions(format!(
                "table_size must be in 1..={MAX_TABLE_SIZE}, got {}", self.table_size
            )));
        }
        if level == 0 && (self.block_size == 0 || self.block_size > u32::MAX as u64) {
            return Err(XbcfError::InvalidOptions(format!(
                "block_size must be in 1..={}, got {}", u32::MAX, self.block_size
            )));
        }
        Ok(())
    }
}
