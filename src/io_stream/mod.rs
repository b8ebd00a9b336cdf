//! Streaming container engine: writers and reader.
//!
//! # Leaf writer
//! [`LeafWriter`] buffers caller bytes into `block_size` chunks, compresses
//! each full chunk as one block and records its size in the offset table.
//! `close()` flushes the short tail block and finalises the table through
//! the [`OutputSink`]: back-patched in place for seekable sinks, resubmitted
//! as segment 0 for segmented ones.
//!
//! # Hierarchical assembler
//! [`NodeWriter`] stores complete child containers back to back as the
//! blocks of a level > 0 container and keeps a second table of their
//! logical lengths.
//!
//! # Reader
//! [`XbcfReader`] maps logical positions to blocks at any level, opening
//! nested containers lazily and never seeking the source on sequential
//! reads.

mod assembler;
mod framer;
mod level;
mod reader;

use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::trace;

pub use assembler::NodeWriter;
pub use framer::ContainerSummary;
pub use reader::{XbcfReader, READ_TO_END};

use crate::block::encode_block;
use crate::codec::{BlockCodec, CodecRegistry};
use crate::error::{Result, XbcfError};
use crate::header::Header;
use crate::options::WriteOptions;
use crate::sink::OutputSink;
use framer::Framer;

// ── Leaf writer ──────────────────────────────────────────────────────────────

pub struct LeafWriter<'a> {
    framer:     Framer<'a>,
    codec:      BlockCodec,
    block_size: usize,
    buf:        Vec<u8>,
    written:    u64,
}

impl<'a> LeafWriter<'a> {
    pub fn create(sink: OutputSink<'a>, options: &WriteOptions) -> Result<Self> {
        Self::create_with_registry(sink, options, &CodecRegistry::builtin())
    }

    pub fn create_with_registry(
        sink:     OutputSink<'a>,
        options:  &WriteOptions,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        options.validate(0)?;
        let codec = BlockCodec::new(registry.resolve(options.codec)?, options.compression_level);
        let header = Header::new(0, options.codec, options.block_size, options.table_size);
        let framer = Framer::open(sink, header)?;
        let block_size = options.block_size as usize;
        Ok(Self {
            framer,
            codec,
            block_size,
            buf: Vec::with_capacity(block_size),
            written: 0,
        })
    }

    /// Append bytes to the stream.  Full blocks are compressed and emitted
    /// as soon as they fill.
    pub fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        self.written += data.len() as u64;
        while !data.is_empty() {
            if self.buf.is_empty() && data.len() >= self.block_size {
                let (block, rest) = data.split_at(self.block_size);
                self.emit(block)?;
                data = rest;
                continue;
            }
            let take = (self.block_size - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.block_size {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Logical bytes accepted so far, buffered or not.
    pub fn logical_len(&self) -> u64 {
        self.written
    }

    pub fn blocks_written(&self) -> usize {
        self.framer.blocks()
    }

    /// Emit the short tail block, if any, and finalise the tables.
    pub fn close(mut self) -> Result<ContainerSummary> {
        self.flush_block()?;
        self.framer.finish()
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let block = std::mem::take(&mut self.buf);
        self.emit(&block)?;
        self.buf = block;
        self.buf.clear();
        Ok(())
    }

    fn emit(&mut self, block: &[u8]) -> Result<()> {
        let (prefix, payload) = encode_block(&self.codec, block)?;
        let index = self.framer.emit(prefix, &mut payload.as_slice(), payload.len() as u64, block.len() as u64)?;
        trace!(index, raw = block.len(), compressed = payload.len(), "flushed leaf block");
        Ok(())
    }
}

impl Write for LeafWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    /// Only whole blocks are ever emitted before close, so there is nothing
    /// to push down here.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for LeafWriter<'_> {
    /// Position queries only.  Containers are written strictly forward.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.written),
            other => Err(XbcfError::InvalidOperation(format!("cannot seek to {other:?} while writing")).into()),
        }
    }
}

// ── Convenience builders ─────────────────────────────────────────────────────

/// Build a complete leaf container in memory.
pub fn build_leaf(data: &[u8], options: &WriteOptions) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let mut writer = LeafWriter::create(OutputSink::seekable(&mut out), options)?;
    writer.write_bytes(data)?;
    writer.close()?;
    Ok(out.into_inner())
}

/// Assemble finished child containers, in order, into a level `level`
/// container written to `sink`.
pub fn assemble<'a, C: AsRef<[u8]>>(
    children: &[C],
    level:    u64,
    sink:     OutputSink<'a>,
    options:  &WriteOptions,
) -> Result<ContainerSummary> {
    let mut node = NodeWriter::create(sink, level, options)?;
    for child in children {
        node.add_child_bytes(child.as_ref())?;
    }
    node.close()
}

pub(crate) fn shared_builtin() -> Arc<CodecRegistry> {
    Arc::new(CodecRegistry::builtin())
}
