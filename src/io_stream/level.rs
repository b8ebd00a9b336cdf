//! One container level: its block reader and its seek/read cursor.
//!
//! A [`Level`] knows where its header starts in the underlying source and
//! nothing about its parent.  Leaf levels turn blocks into decompressed
//! buffers; node levels turn blocks into nested `Level`s opened lazily over
//! the child's byte range.  The cursor logic is written once against
//! [`Level::read_block`] and does not care which of the two it is.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::block::{decode_block, BlockPrefix, BLOCK_PREFIX_LEN};
use crate::codec::{BlockCodec, CodecRegistry};
use crate::error::{Result, XbcfError};
use crate::header::Header;
use crate::options::DEFAULT_COMPRESSION_LEVEL;
use crate::table::{decode_table, OffsetTable};

/// Byte source that remembers its position so sequential block reads never
/// issue a seek.
pub(crate) struct Source<R> {
    inner: R,
    pos:   u64,
}

impl<R: Read + Seek> Source<R> {
    pub(crate) fn new(mut inner: R) -> io::Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self { inner, pos })
    }

    pub(crate) fn seek_to(&mut self, at: u64) -> io::Result<()> {
        if self.pos != at {
            trace!(from = self.pos, to = at, "repositioning source");
            self.inner.seek(SeekFrom::Start(at))?;
            self.pos = at;
        }
        Ok(())
    }

    /// Total length of the underlying source.
    pub(crate) fn end(&mut self) -> io::Result<u64> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.pos = end;
        Ok(end)
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// How blocks of a level are interpreted, fixed at open.
enum BlockKind {
    Leaf(BlockCodec),
    Node(Arc<CodecRegistry>),
}

/// Result of reading one block slot.
enum Block {
    Data(Vec<u8>),
    Child(Box<Level>),
    /// No data at or after this slot.
    Tombstone,
}

enum CursorState {
    /// Nothing loaded yet for `Level::block`.
    Idle,
    Buffer { data: Vec<u8>, offset: usize },
    Child(Box<Level>),
    Exhausted,
}

enum Step {
    Stay,
    Load,
    Advance,
}

pub(crate) struct Level {
    header:       Header,
    physical:     OffsetTable,
    logical:      Option<OffsetTable>,
    kind:         BlockKind,
    blocks:       usize,
    /// Source offset of block 0.
    data:         u64,
    /// Head plus every used block.
    physical_len: u64,
    len:          u64,
    pos:          u64,
    block:        usize,
    state:        CursorState,
}

impl Level {
    /// Parse the header and tables of the container starting at `base`.
    /// The container must end at or before source offset `limit`.
    ///
    /// `known_len` is the logical length recorded by a parent level.  When
    /// given it is checked against the tables instead of reading the last
    /// block's prefix, which keeps sequential reads free of seeks.
    pub(crate) fn open<R: Read + Seek>(
        src: &mut Source<R>,
        base: u64,
        limit: u64,
        registry: &Arc<CodecRegistry>,
        known_len: Option<u64>,
    ) -> Result<Self> {
        src.seek_to(base)?;
        let header = Header::read(&mut *src)?;
        let codec = registry.resolve(header.codec)?;

        let mut raw = vec![0u8; header.table_bytes()];
        src.read_exact(&mut raw)?;
        let physical = decode_table(&raw, header.table_size)?;
        let logical = if header.has_logical_table() {
            src.read_exact(&mut raw)?;
            Some(decode_table(&raw, header.table_size)?)
        } else {
            None
        };
        let blocks = physical.used_blocks()?;

        let payload = physical.total(blocks);
        let bounds = base
            .checked_add(header.head_len())
            .and_then(|data| Some((data, data.checked_add(payload)?)));
        let Some((data, end)) = bounds.filter(|&(_, end)| end <= limit) else {
            return Err(XbcfError::CorruptTable(format!(
                "{blocks} blocks of {payload} bytes run past the {} bytes available",
                limit.saturating_sub(base)
            )));
        };

        let kind = if header.level == 0 {
            BlockKind::Leaf(BlockCodec::new(codec, DEFAULT_COMPRESSION_LEVEL))
        } else {
            BlockKind::Node(Arc::clone(registry))
        };

        let mut level = Self {
            header,
            physical,
            logical,
            kind,
            blocks,
            data,
            physical_len: end - base,
            len: 0,
            pos: 0,
            block: 0,
            state: CursorState::Idle,
        };
        level.len = level.measure(src, known_len)?;
        debug!(
            base,
            level = level.header.level,
            blocks,
            len = level.len,
            "opened container"
        );
        Ok(level)
    }

    pub(crate) fn header(&self) -> &Header {
        &self.header
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn block_count(&self) -> usize {
        self.blocks
    }

    pub(crate) fn physical_offsets(&self) -> &[u64] {
        self.physical.ends()
    }

    pub(crate) fn logical_offsets(&self) -> Option<&[u64]> {
        self.logical.as_ref().map(|t| t.ends())
    }

    /// Head plus every used block.
    pub(crate) fn physical_len(&self) -> u64 {
        self.physical_len
    }

    /// Logical length of leaf block `index`: full except for the last.
    fn leaf_block_len(&self, index: usize) -> u64 {
        let bs = self.header.block_size;
        self.len.saturating_sub(index as u64 * bs).min(bs)
    }

    /// Logical length.  Leaf levels without a `known_len` read the prefix
    /// of their last block.
    fn measure<R: Read + Seek>(&self, src: &mut Source<R>, known_len: Option<u64>) -> Result<u64> {
        if let Some(logical) = &self.logical {
            let len = logical.total(self.blocks);
            return match known_len {
                Some(known) if known != len => Err(XbcfError::CorruptTable(format!(
                    "container holds {len} logical bytes, parent table says {known}"
                ))),
                _ => Ok(len),
            };
        }
        let bs = self.header.block_size;
        if let Some(known) = known_len {
            if known.div_ceil(bs) != self.blocks as u64 {
                return Err(XbcfError::CorruptTable(format!(
                    "{known} logical bytes do not fit {} blocks of {bs}", self.blocks
                )));
            }
            return Ok(known);
        }
        let Some(last) = self.blocks.checked_sub(1) else {
            return Ok(0);
        };
        let (start, len) = self.physical.range(last).unwrap_or((0, 0));
        if len < BLOCK_PREFIX_LEN {
            return Err(XbcfError::CorruptTable(format!("block {last} is {len} bytes, shorter than its prefix")));
        }
        src.seek_to(self.data + start)?;
        let prefix = BlockPrefix::read(&mut *src)?;
        let tail = prefix.logical_len as u64;
        if tail == 0 || tail > bs {
            return Err(XbcfError::CorruptTable(format!(
                "last block claims {tail} bytes with block size {bs}"
            )));
        }
        Ok(last as u64 * bs + tail)
    }

    // ── Block reader ─────────────────────────────────────────────────────────

    fn read_block<R: Read + Seek>(&self, src: &mut Source<R>, index: usize) -> Result<Block> {
        if index >= self.blocks {
            trace!(index, level = self.header.level, "read past last block");
            return Ok(Block::Tombstone);
        }
        let Some((start, len)) = self.physical.range(index) else {
            return Ok(Block::Tombstone);
        };
        if len < BLOCK_PREFIX_LEN {
            return Err(XbcfError::CorruptTable(format!("block {index} is {len} bytes, shorter than its prefix")));
        }
        // Bounded by `limit` at open.
        let at = self.data + start;

        match &self.kind {
            BlockKind::Leaf(codec) => {
                src.seek_to(at)?;
                let prefix = BlockPrefix::read(&mut *src)?;
                let expected = self.leaf_block_len(index);
                if prefix.logical_len as u64 != expected {
                    return Err(XbcfError::CorruptTable(format!(
                        "block {index} claims {} bytes, expected {expected} with block size {}",
                        prefix.logical_len, self.header.block_size
                    )));
                }
                let payload_len = len - BLOCK_PREFIX_LEN;
                let mut payload = Vec::new();
                let got = Read::take(&mut *src, payload_len).read_to_end(&mut payload)? as u64;
                if got != payload_len {
                    return Err(XbcfError::CorruptTable(format!(
                        "block {index} ends after {got} of {payload_len} payload bytes"
                    )));
                }
                trace!(index, at, len, logical_len = prefix.logical_len, "loaded block");
                Ok(Block::Data(decode_block(&prefix, &payload, codec)?))
            }
            BlockKind::Node(registry) => {
                let expected = self
                    .logical
                    .as_ref()
                    .and_then(|t| t.range(index))
                    .map(|(_, len)| len)
                    .unwrap_or(0);
                // Read the prefix rather than skip it so the source stays
                // sequential.
                src.seek_to(at)?;
                let prefix = BlockPrefix::read(&mut *src)?;
                if prefix != BlockPrefix::for_child(expected) {
                    return Err(XbcfError::CorruptTable(format!(
                        "child {index} prefix says {} bytes, parent table says {expected}",
                        prefix.logical_len
                    )));
                }
                let child = Level::open(src, at + BLOCK_PREFIX_LEN, at + len, registry, Some(expected))?;
                self.check_child(index, &child, len)?;
                trace!(index, at, len, logical_len = expected, "opened child");
                Ok(Block::Child(Box::new(child)))
            }
        }
    }

    fn check_child(&self, index: usize, child: &Level, physical_len: u64) -> Result<()> {
        // Node levels start at 1.
        if child.header.level != self.header.level - 1 {
            return Err(XbcfError::CorruptTable(format!(
                "child {index} has level {} under level {}", child.header.level, self.header.level
            )));
        }
        if child.physical_len() + BLOCK_PREFIX_LEN != physical_len {
            return Err(XbcfError::CorruptTable(format!(
                "child {index} spans {} bytes, parent table says {}",
                child.physical_len() + BLOCK_PREFIX_LEN, physical_len
            )));
        }
        Ok(())
    }

    fn load<R: Read + Seek>(&self, src: &mut Source<R>, index: usize) -> Result<CursorState> {
        Ok(match self.read_block(src, index)? {
            Block::Data(data) => CursorState::Buffer { data, offset: 0 },
            Block::Child(child) => CursorState::Child(child),
            Block::Tombstone => CursorState::Exhausted,
        })
    }

    // ── Cursor ───────────────────────────────────────────────────────────────

    /// Block index and intra-block offset of logical position `pos`.
    fn locate(&self, pos: u64) -> (usize, u64) {
        match &self.logical {
            None => {
                let bs = self.header.block_size;
                ((pos / bs) as usize, pos % bs)
            }
            Some(logical) => {
                let index = logical.locate(pos, self.blocks);
                (index, pos - logical.start(index))
            }
        }
    }

    pub(crate) fn seek<R: Read + Seek>(&mut self, src: &mut Source<R>, pos: u64) -> Result<()> {
        self.pos = pos;
        if pos >= self.len {
            self.block = self.blocks;
            self.state = CursorState::Exhausted;
            return Ok(());
        }
        let (index, intra) = self.locate(pos);
        let loaded = matches!(self.state, CursorState::Buffer { .. } | CursorState::Child(_));
        if !(loaded && self.block == index) {
            trace!(pos, index, level = self.header.level, "seeking to block");
            self.block = index;
            self.state = self.load(src, index)?;
        }
        match &mut self.state {
            CursorState::Buffer { offset, .. } => *offset = intra as usize,
            CursorState::Child(child) => child.seek(src, intra)?,
            CursorState::Idle | CursorState::Exhausted => {}
        }
        Ok(())
    }

    /// Fill `buf` from the current position, crossing block boundaries.
    /// Returns fewer bytes than requested only at end of data.
    pub(crate) fn read<R: Read + Seek>(&mut self, src: &mut Source<R>, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let step = match &mut self.state {
                CursorState::Idle => Step::Load,
                CursorState::Buffer { data, offset } => {
                    let avail = &data[(*offset).min(data.len())..];
                    let n = avail.len().min(buf.len() - filled);
                    buf[filled..filled + n].copy_from_slice(&avail[..n]);
                    *offset += n;
                    filled += n;
                    if n == 0 { Step::Advance } else { Step::Stay }
                }
                CursorState::Child(child) => {
                    let n = child.read(src, &mut buf[filled..])?;
                    filled += n;
                    // A child only comes up short once it is exhausted.
                    if filled < buf.len() { Step::Advance } else { Step::Stay }
                }
                CursorState::Exhausted => break,
            };
            match step {
                Step::Stay => {}
                Step::Load => self.state = self.load(src, self.block)?,
                Step::Advance => {
                    self.block += 1;
                    self.state = self.load(src, self.block)?;
                }
            }
        }
        self.pos += filled as u64;
        Ok(filled)
    }
}
