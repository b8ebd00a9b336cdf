use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use tracing::debug;

use crate::block::BlockPrefix;
use crate::codec::CodecRegistry;
use crate::error::{Result, XbcfError};
use crate::header::Header;
use crate::io_stream::framer::{ContainerSummary, Framer};
use crate::io_stream::{shared_builtin, XbcfReader};
use crate::options::WriteOptions;
use crate::sink::OutputSink;

/// Writer for a level > 0 container whose blocks are whole child
/// containers.
///
/// Children are submitted one at a time in their final order.  They may be
/// produced elsewhere (other threads, other machines) as long as each one
/// is complete before it is handed over.
pub struct NodeWriter<'a> {
    framer:   Framer<'a>,
    registry: Arc<CodecRegistry>,
}

impl<'a> NodeWriter<'a> {
    pub fn create(sink: OutputSink<'a>, level: u64, options: &WriteOptions) -> Result<Self> {
        Self::create_with_registry(sink, level, options, shared_builtin())
    }

    pub fn create_with_registry(
        sink:     OutputSink<'a>,
        level:    u64,
        options:  &WriteOptions,
        registry: Arc<CodecRegistry>,
    ) -> Result<Self> {
        if level == 0 {
            return Err(XbcfError::InvalidOptions("node containers start at level 1".into()));
        }
        options.validate(level)?;
        registry.resolve(options.codec)?;
        let header = Header::new(level, options.codec, 0, options.table_size);
        let framer = Framer::open(sink, header)?;
        Ok(Self { framer, registry })
    }

    pub fn level(&self) -> u64 {
        self.framer.header().level
    }

    pub fn children(&self) -> usize {
        self.framer.blocks()
    }

    pub fn logical_len(&self) -> u64 {
        self.framer.logical_len()
    }

    /// Append the container that starts at the current position of `child`
    /// and runs to its end.  The child is opened and checked first: it must
    /// be exactly one level below this one and contain nothing but itself.
    pub fn add_child<R: Read + Seek>(&mut self, mut child: R) -> Result<()> {
        let start = child.stream_position()?;
        let end = child.seek(SeekFrom::End(0))?;
        let total = end.saturating_sub(start);

        let (child_level, physical_len, logical_len) = {
            let reader = XbcfReader::open_with_registry(&mut child, start, Arc::clone(&self.registry))?;
            (reader.level(), reader.physical_len(), reader.len())
        };
        // `create` rejects level 0.
        if child_level != self.level() - 1 {
            return Err(XbcfError::InvalidOperation(format!(
                "level {child_level} container cannot be a child of level {}", self.level()
            )));
        }
        if physical_len != total {
            return Err(XbcfError::Format(format!(
                "child container spans {physical_len} bytes but {total} were supplied"
            )));
        }

        child.seek(SeekFrom::Start(start))?;
        let index = self.framer.emit(BlockPrefix::for_child(logical_len), &mut child, total, logical_len)?;
        debug!(index, physical_len, logical_len, level = self.level(), "added child container");
        Ok(())
    }

    pub fn add_child_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.add_child(Cursor::new(bytes))
    }

    pub fn close(mut self) -> Result<ContainerSummary> {
        self.framer.finish()
    }
}
