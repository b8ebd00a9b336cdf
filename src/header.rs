//! Fixed 96-byte container header.
//!
//! ```text
//!  0..4    format tag "XBCF"          4..8    zero
//!  8..16   level (u64)
//! 16..19   codec tag                 19..32   zero
//! 32..36   cipher "null"             36..48   zero
//! 48..64   IV placeholder
//! 64..72   block size (u64)          72..80   table size (u64)
//! 80..96   reserved
//! ```
//!
//! All integers are little-endian.  The offset tables follow immediately.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read, Write};

use crate::codec::CodecTag;
use crate::error::{Result, XbcfError};

pub const FORMAT_TAG: &[u8; 4] = b"XBCF";
/// The only cipher this format currently admits.
pub const NO_CIPHER: &[u8; 4] = b"null";
pub const IV_PLACEHOLDER: [u8; 16] = *b"iviviviviviviviv";
pub const HEADER_LEN: usize = 96;
/// Upper bound on `table_size` accepted from disk.
pub const MAX_TABLE_SIZE: u64 = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub level:      u64,
    pub codec:      CodecTag,
    pub cipher:     [u8; 4],
    pub iv:         [u8; 16],
    /// Logical bytes per leaf block; 0 means variable-size children.
    pub block_size: u64,
    /// Number of slots in each offset table.
    pub table_size: u64,
}

impl Header {
    pub fn new(level: u64, codec: CodecTag, block_size: u64, table_size: u64) -> Self {
        Self {
            level,
            codec,
            cipher: *NO_CIPHER,
            iv: IV_PLACEHOLDER,
            block_size: if level > 0 { 0 } else { block_size },
            table_size,
        }
    }

    /// Whether the cumulative logical-length table follows the physical one.
    pub fn has_logical_table(&self) -> bool {
        self.block_size == 0
    }

    pub fn table_bytes(&self) -> usize {
        self.table_size as usize * 8
    }

    /// Header plus all offset tables; block offsets are relative to this.
    pub fn head_len(&self) -> u64 {
        let tables = if self.has_logical_table() { 2 } else { 1 };
        (HEADER_LEN + tables * self.table_bytes()) as u64
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(FORMAT_TAG);
        LittleEndian::write_u64(&mut out[8..16], self.level);
        out[16..19].copy_from_slice(self.codec.as_bytes());
        out[32..36].copy_from_slice(&self.cipher);
        out[48..64].copy_from_slice(&self.iv);
        LittleEndian::write_u64(&mut out[64..72], self.block_size);
        LittleEndian::write_u64(&mut out[72..80], self.table_size);
        out
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut raw = [0u8; HEADER_LEN];
        reader.read_exact(&mut raw)?;
        Self::decode(&raw)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(XbcfError::Format(format!(
                "header needs {HEADER_LEN} bytes, got {}", bytes.len()
            )));
        }
        let mut r = &bytes[..HEADER_LEN];

        let mut tag = [0u8; 4];
        r.read_exact(&mut tag)?;
        if &tag != FORMAT_TAG {
            return Err(XbcfError::Format(format!("bad format tag {:?}", String::from_utf8_lossy(&tag))));
        }
        skip(&mut r, 4)?;
        let level = r.read_u64::<LittleEndian>()?;
        let mut codec = [0u8; 3];
        r.read_exact(&mut codec)?;
        skip(&mut r, 13)?;
        let mut cipher = [0u8; 4];
        r.read_exact(&mut cipher)?;
        if &cipher != NO_CIPHER {
            return Err(XbcfError::Format(format!(
                "unsupported cipher {:?}", String::from_utf8_lossy(&cipher)
            )));
        }
        skip(&mut r, 12)?;
        let mut iv = [0u8; 16];
        r.read_exact(&mut iv)?;
        let block_size = r.read_u64::<LittleEndian>()?;
        let table_size = r.read_u64::<LittleEndian>()?;

        let header = Self { level, codec: CodecTag(codec), cipher, iv, block_size, table_size };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.table_size == 0 || self.table_size > MAX_TABLE_SIZE {
            return Err(XbcfError::Format(format!("table size {} out of range", self.table_size)));
        }
        match (self.level, self.block_size) {
            (0, 0) => Err(XbcfError::Format("leaf container with zero block size".into())),
            (0, bs) if bs > u32::MAX as u64 => {
                Err(XbcfError::Format(format!("block size {bs} exceeds the 32-bit block prefix")))
            }
            (l, bs) if l > 0 && bs != 0 => {
                Err(XbcfError::Format(format!("level {l} container declares block size {bs}")))
            }
            _ => Ok(()),
        }
    }
}

fn skip(r: &mut &[u8], n: usize) -> io::Result<()> {
    let mut pad = [0u8; 16];
    r.read_exact(&mut pad[..n])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_fixed() {
        let h = Header::new(0, CodecTag::LZ4, 1 << 20, 1024);
        let raw = h.encode();
        assert_eq!(raw.len(), HEADER_LEN);
        assert_eq!(&raw[0..4], b"XBCF");
        assert_eq!(&raw[8..16], &0u64.to_le_bytes());
        assert_eq!(&raw[16..19], b"LZ4");
        assert_eq!(&raw[32..36], b"null");
        assert_eq!(&raw[48..64], b"iviviviviviviviv");
        assert_eq!(&raw[64..72], &(1u64 << 20).to_le_bytes());
        assert_eq!(&raw[72..80], &1024u64.to_le_bytes());
        assert_eq!(Header::decode(&raw).unwrap(), h);
    }

    #[test]
    fn write_emits_encoded_bytes() {
        let h = Header::new(3, CodecTag::SNAPPY, 0, 7);
        let mut out = Vec::new();
        h.write(&mut out).unwrap();
        assert_eq!(out, h.encode());
        assert!(out[4..8].iter().chain(&out[19..32]).chain(&out[36..48]).chain(&out[80..]).all(|&b| b == 0));
        assert_eq!(Header::read(&out[..]).unwrap(), h);
    }

    #[test]
    fn node_headers_drop_block_size() {
        let h = Header::new(2, CodecTag::ZSTD, 4096, 16);
        assert_eq!(h.block_size, 0);
        assert!(h.has_logical_table());
        assert_eq!(h.head_len(), (HEADER_LEN + 2 * 16 * 8) as u64);
    }

    #[test]
    fn rejects_bad_tag() {
        let mut raw = Header::new(0, CodecTag::LZ4, 64, 4).encode();
        raw[0] = b'Y';
        assert!(matches!(Header::decode(&raw), Err(XbcfError::Format(_))));
    }

    #[test]
    fn rejects_cipher() {
        let mut raw = Header::new(0, CodecTag::LZ4, 64, 4).encode();
        raw[32..36].copy_from_slice(b"AES-");
        assert!(matches!(Header::decode(&raw), Err(XbcfError::Format(_))));
    }

    #[test]
    fn rejects_inconsistent_sizes() {
        let mut leaf = Header::new(0, CodecTag::LZ4, 64, 4);
        leaf.block_size = 0;
        assert!(matches!(Header::decode(&leaf.encode()), Err(XbcfError::Format(_))));

        let mut node = Header::new(1, CodecTag::LZ4, 0, 4);
        node.block_size = 64;
        assert!(matches!(Header::decode(&node.encode()), Err(XbcfError::Format(_))));

        let empty_table = Header::new(0, CodecTag::LZ4, 64, 0);
        assert!(matches!(Header::decode(&empty_table.encode()), Err(XbcfError::Format(_))));
    }

    #[test]
    fn short_input_is_a_format_error() {
        assert!(matches!(Header::decode(&[0u8; 10]), Err(XbcfError::Format(_))));
    }
}
