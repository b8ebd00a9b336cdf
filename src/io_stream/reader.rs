use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::codec::CodecRegistry;
use crate::error::{Result, XbcfError};
use crate::header::Header;
use crate::io_stream::level::{Level, Source};

/// Length that means "everything up to end of data" for
/// [`XbcfReader::read_bytes`].
pub const READ_TO_END: u64 = u64::MAX;

/// Bytes pulled from the level tree per step of `read_bytes`.
const READ_CHUNK: usize = 64 * 1024;

/// Random-access reader over one container, leaf or hierarchical.
///
/// The reader owns the byte source; nested containers are opened lazily
/// over byte ranges of the same source as the cursor reaches them.  A
/// handle is not meant to be shared between threads, but any number of
/// independent readers may be opened over the same finished file.
pub struct XbcfReader<R: Read + Seek> {
    source: Source<R>,
    root:   Level,
}

impl<R: Read + Seek> XbcfReader<R> {
    /// Open the container at offset 0 with the built-in codecs.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_at(reader, 0)
    }

    /// Open a container embedded at `offset` in `reader`.
    pub fn open_at(reader: R, offset: u64) -> Result<Self> {
        Self::open_with_registry(reader, offset, Arc::new(CodecRegistry::builtin()))
    }

    pub fn open_with_registry(reader: R, offset: u64, registry: Arc<CodecRegistry>) -> Result<Self> {
        let mut source = Source::new(reader)?;
        let end = source.end()?;
        let root = Level::open(&mut source, offset, end, &registry, None)?;
        Ok(Self { source, root })
    }

    pub fn header(&self) -> &Header {
        self.root.header()
    }

    pub fn level(&self) -> u64 {
        self.root.header().level
    }

    /// Logical (uncompressed) length of the whole stream.
    pub fn len(&self) -> u64 {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.len() == 0
    }

    /// Current logical position.
    pub fn position(&self) -> u64 {
        self.root.position()
    }

    /// Blocks (or children) used at the top level.
    pub fn block_count(&self) -> usize {
        self.root.block_count()
    }

    /// Serialized length of the container.
    pub fn physical_len(&self) -> u64 {
        self.root.physical_len()
    }

    /// Cumulative physical block end offsets, one per table slot.
    pub fn physical_offsets(&self) -> &[u64] {
        self.root.physical_offsets()
    }

    /// Cumulative logical block end offsets; present only on node levels.
    pub fn logical_offsets(&self) -> Option<&[u64]> {
        self.root.logical_offsets()
    }

    /// Move the cursor to logical position `pos`.  Positions at or past the
    /// end are allowed; reads from there return nothing.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.root.seek(&mut self.source, pos)
    }

    /// Read up to `length` bytes.  A shorter result means end of data.
    pub fn read_bytes(&mut self, length: u64) -> Result<Vec<u8>> {
        let remaining = self.len().saturating_sub(self.position());
        let mut out = Vec::with_capacity(length.min(remaining) as usize);
        let mut chunk = vec![0u8; (length.min(READ_CHUNK as u64) as usize).max(1)];
        while (out.len() as u64) < length {
            let want = (length - out.len() as u64).min(chunk.len() as u64) as usize;
            let n = self.root.read(&mut self.source, &mut chunk[..want])?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    /// Everything from the current position to the end.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>> {
        self.read_bytes(READ_TO_END)
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }
}

impl<R: Read + Seek> Read for XbcfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.root.read(&mut self.source, buf)?)
    }
}

impl<R: Read + Seek> Seek for XbcfReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.position().checked_add_signed(d),
            SeekFrom::End(d) => self.len().checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::from(XbcfError::InvalidOperation(format!("seek to {pos:?} before start of stream")))
        })?;
        self.seek_to(target)?;
        Ok(target)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position())
    }
}
