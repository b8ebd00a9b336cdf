//! Codec registry: named byte transforms selected by the header's codec tag.
//!
//! # Identity rules
//! Every codec is identified by a 3-byte ASCII [`CodecTag`] written into the
//! container header.  The tag applies to every leaf block of that container;
//! there is no per-block codec.  A reader that cannot resolve the tag fails
//! at open time, before any block is touched.
//!
//! # Extensibility
//! [`CodecRegistry::builtin`] covers the codecs this crate links against.
//! Additional transforms are added with [`CodecRegistry::register`] and the
//! registry is handed to readers and writers as an `Arc`, so the container
//! engine never needs to know about them.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Result, XbcfError};

// ── Codec tags ───────────────────────────────────────────────────────────────

/// Fixed-width codec identifier as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodecTag(pub [u8; 3]);

impl CodecTag {
    /// LZ4 block format.  Fastest; the default.
    pub const LZ4:    CodecTag = CodecTag(*b"LZ4");
    /// Zstandard.
    pub const ZSTD:   CodecTag = CodecTag(*b"ZST");
    /// Brotli.  Good ratio on text.
    pub const BROTLI: CodecTag = CodecTag(*b"BRO");
    /// LZMA.  Highest ratio, slowest.
    pub const LZMA:   CodecTag = CodecTag(*b"LZM");
    /// Snappy raw format.
    pub const SNAPPY: CodecTag = CodecTag(*b"sna");
    /// Payload stored verbatim.
    pub const RAW:    CodecTag = CodecTag(*b"RAW");

    /// Parse a tag from its textual form.  Exactly three ASCII bytes.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes: [u8; 3] = s.as_bytes().try_into().ok()?;
        bytes.is_ascii().then_some(CodecTag(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<String> for CodecTag {
    type Error = String;
    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        CodecTag::parse(&s).ok_or_else(|| format!("codec tag must be 3 ASCII bytes, got {s:?}"))
    }
}

impl From<CodecTag> for String {
    fn from(tag: CodecTag) -> Self {
        tag.to_string()
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// The transform ran but did not reproduce the recorded logical length.
    #[error("Decompressed {actual} bytes, block prefix says {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn tag(&self) -> CodecTag;
    fn compress(&self, data: &[u8], level: i32) -> std::result::Result<Vec<u8>, CodecError>;
    /// `expected_len` is the logical length recorded in the block prefix.
    /// Codecs may use it as a size hint; [`BlockCodec`] checks the result.
    fn decompress(&self, data: &[u8], expected_len: usize) -> std::result::Result<Vec<u8>, CodecError>;
}

impl fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("tag", &self.tag()).finish()
    }
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct RawCodec;
impl Codec for RawCodec {
    fn tag(&self) -> CodecTag { CodecTag::RAW }
    fn compress(&self, data: &[u8], _: i32) -> std::result::Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], _: usize) -> std::result::Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn tag(&self) -> CodecTag { CodecTag::LZ4 }
    fn compress(&self, data: &[u8], _: i32) -> std::result::Result<Vec<u8>, CodecError> {
        // The block prefix already carries the size, so use the bare block format.
        Ok(lz4_flex::compress(data))
    }
    fn decompress(&self, data: &[u8], expected_len: usize) -> std::result::Result<Vec<u8>, CodecError> {
        lz4_flex::decompress(data, expected_len)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn tag(&self) -> CodecTag { CodecTag::ZSTD }
    fn compress(&self, data: &[u8], level: i32) -> std::result::Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], _: usize) -> std::result::Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn tag(&self) -> CodecTag { CodecTag::BROTLI }
    fn compress(&self, data: &[u8], level: i32) -> std::result::Result<Vec<u8>, CodecError> {
        let quality = level.clamp(0, 11) as u32;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
            w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8], expected_len: usize) -> std::result::Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(expected_len);
        brotli::Decompressor::new(data, 4096)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn tag(&self) -> CodecTag { CodecTag::LZMA }
    fn compress(&self, data: &[u8], _: i32) -> std::result::Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8], expected_len: usize) -> std::result::Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(expected_len);
        lzma_rs::lzma_decompress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct SnappyCodec;
impl Codec for SnappyCodec {
    fn tag(&self) -> CodecTag { CodecTag::SNAPPY }
    fn compress(&self, data: &[u8], _: i32) -> std::result::Result<Vec<u8>, CodecError> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], _: usize) -> std::result::Result<Vec<u8>, CodecError> {
        snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Maps codec tags to transforms.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<CodecTag, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// An empty registry.  Nothing resolves until codecs are registered.
    pub fn empty() -> Self {
        Self { codecs: HashMap::new() }
    }

    /// Registry holding every codec this build links against.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(Arc::new(Lz4Codec));
        reg.register(Arc::new(ZstdCodec));
        reg.register(Arc::new(BrotliCodec));
        reg.register(Arc::new(LzmaCodec));
        reg.register(Arc::new(SnappyCodec));
        reg.register(Arc::new(RawCodec));
        reg
    }

    /// Add a codec, replacing any earlier entry with the same tag.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.tag(), codec);
    }

    pub fn contains(&self, tag: CodecTag) -> bool {
        self.codecs.contains_key(&tag)
    }

    /// Resolve a tag.  The caller MUST NOT fall back to another codec.
    pub fn resolve(&self, tag: CodecTag) -> Result<Arc<dyn Codec>> {
        self.codecs
            .get(&tag)
            .cloned()
            .ok_or_else(|| XbcfError::UnsupportedCodec(tag.to_string()))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<String> = self.codecs.keys().map(|t| t.to_string()).collect();
        tags.sort();
        f.debug_struct("CodecRegistry").field("codecs", &tags).finish()
    }
}

// ── Block codec adapter ──────────────────────────────────────────────────────

/// A resolved codec plus the compression level used when writing.
#[derive(Clone)]
pub struct BlockCodec {
    codec: Arc<dyn Codec>,
    level: i32,
}

impl BlockCodec {
    pub fn new(codec: Arc<dyn Codec>, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn tag(&self) -> CodecTag {
        self.codec.tag()
    }

    pub fn compress(&self, data: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
        self.codec.compress(data, self.level)
    }

    /// Decompress and require exactly `expected_len` bytes back.
    pub fn decompress(&self, data: &[u8], expected_len: usize) -> std::result::Result<Vec<u8>, CodecError> {
        let out = self.codec.decompress(data, expected_len)?;
        if out.len() != expected_len {
            return Err(CodecError::LengthMismatch { expected: expected_len, actual: out.len() });
        }
        Ok(out)
    }
}

impl fmt::Debug for BlockCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCodec")
            .field("tag", &self.codec.tag())
            .field("level", &self.level)
            .finish()
    }
}
