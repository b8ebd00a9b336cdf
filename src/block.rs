use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::codec::{BlockCodec, CodecError};

/// Bytes in front of every block: its logical length as a LE u32.
pub const BLOCK_PREFIX_LEN: u64 = 4;

/// Logical length written in front of a block.
///
/// For leaf blocks this is the uncompressed size.  For child containers it
/// is the child's logical length, saturated at `u32::MAX`; readers take the
/// exact value from the parent's logical table instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPrefix {
    pub logical_len: u32,
}

impl BlockPrefix {
    pub fn for_child(logical_len: u64) -> Self {
        Self { logical_len: u32::try_from(logical_len).unwrap_or(u32::MAX) }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.logical_len)
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self { logical_len: reader.read_u32::<LittleEndian>()? })
    }
}

/// Compress one leaf block.  The returned payload excludes the prefix.
pub fn encode_block(codec: &BlockCodec, data: &[u8]) -> Result<(BlockPrefix, Vec<u8>), CodecError> {
    let logical_len = u32::try_from(data.len())
        .map_err(|_| CodecError::Compression(format!("block of {} bytes exceeds u32", data.len())))?;
    let payload = codec.compress(data)?;
    Ok((BlockPrefix { logical_len }, payload))
}

pub fn decode_block(prefix: &BlockPrefix, payload: &[u8], codec: &BlockCodec) -> Result<Vec<u8>, CodecError> {
    codec.decompress(payload, prefix.logical_len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecRegistry, CodecTag};

    #[test]
    fn prefix_is_little_endian() {
        let mut out = Vec::new();
        BlockPrefix { logical_len: 0x0102_0304 }.write(&mut out).unwrap();
        assert_eq!(out, [4, 3, 2, 1]);
        assert_eq!(BlockPrefix::read(&out[..]).unwrap().logical_len, 0x0102_0304);
    }

    #[test]
    fn child_prefix_saturates() {
        assert_eq!(BlockPrefix::for_child(19).logical_len, 19);
        assert_eq!(BlockPrefix::for_child(u64::MAX).logical_len, u32::MAX);
    }

    #[test]
    fn block_roundtrip_and_corruption() {
        let reg = CodecRegistry::builtin();
        let codec = BlockCodec::new(reg.resolve(CodecTag::ZSTD).unwrap(), 3);
        let data = vec![7u8; 5000];
        let (prefix, payload) = encode_block(&codec, &data).unwrap();
        assert_eq!(prefix.logical_len, 5000);
        assert_eq!(decode_block(&prefix, &payload, &codec).unwrap(), data);

        let lying = BlockPrefix { logical_len: 4999 };
        assert!(matches!(
            decode_block(&lying, &payload, &codec),
            Err(CodecError::LengthMismatch { expected: 4999, actual: 5000 })
        ));
    }
}
