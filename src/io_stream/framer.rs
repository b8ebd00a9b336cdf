//! Head emission, block framing and table finalisation shared by both
//! writers.

use std::io::{self, Read, Seek, SeekFrom, Write};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::block::{BlockPrefix, BLOCK_PREFIX_LEN};
use crate::error::{Result, XbcfError};
use crate::header::{Header, HEADER_LEN};
use crate::sink::OutputSink;
use crate::table::SizeTable;

/// What a closed container looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub level:        u64,
    pub blocks:       usize,
    pub logical_len:  u64,
    /// Serialized length: head plus every block.
    pub physical_len: u64,
}

pub(crate) struct Framer<'a> {
    sink:         OutputSink<'a>,
    header:       Header,
    /// Sink position of the header (seekable sinks only).
    base:         u64,
    physical:     SizeTable,
    logical:      SizeTable,
    next_segment: usize,
    logical_len:  u64,
    finished:     bool,
}

impl<'a> Framer<'a> {
    /// Emit the header with zeroed tables.
    pub(crate) fn open(mut sink: OutputSink<'a>, header: Header) -> Result<Self> {
        let head = zeroed_head(&header)?;
        let mut base = 0;
        let mut next_segment = 0;
        match &mut sink {
            OutputSink::Seekable(w) => {
                base = w.stream_position()?;
                w.write_all(&head)?;
            }
            OutputSink::Segmented(s) => {
                s.append_segment(0, &head)?;
                next_segment = 1;
            }
        }
        debug!(level = header.level, codec = %header.codec, base, "opened container for writing");
        Ok(Self {
            sink,
            physical: SizeTable::new(header.table_size),
            logical: SizeTable::new(header.table_size),
            header,
            base,
            next_segment,
            logical_len: 0,
            finished: false,
        })
    }

    pub(crate) fn header(&self) -> &Header {
        &self.header
    }

    pub(crate) fn blocks(&self) -> usize {
        self.physical.used()
    }

    pub(crate) fn logical_len(&self) -> u64 {
        self.logical_len
    }

    /// Append one block: the prefix followed by `payload_len` bytes from
    /// `payload`.  The table slot is claimed before anything is written.
    pub(crate) fn emit(
        &mut self,
        prefix: BlockPrefix,
        payload: &mut dyn Read,
        payload_len: u64,
        logical_len: u64,
    ) -> Result<usize> {
        let index = self.physical.push(payload_len + BLOCK_PREFIX_LEN)?;
        self.logical.push(logical_len)?;

        match &mut self.sink {
            OutputSink::Seekable(w) => {
                prefix.write(&mut *w)?;
                let copied = io::copy(&mut Read::take(&mut *payload, payload_len), w)?;
                if copied != payload_len {
                    return Err(short_payload(copied, payload_len));
                }
            }
            OutputSink::Segmented(s) => {
                let mut segment = Vec::with_capacity((payload_len + BLOCK_PREFIX_LEN) as usize);
                prefix.write(&mut segment)?;
                let copied = Read::take(&mut *payload, payload_len).read_to_end(&mut segment)? as u64;
                if copied != payload_len {
                    return Err(short_payload(copied, payload_len));
                }
                s.append_segment(self.next_segment, &segment)?;
                self.next_segment += 1;
            }
        }
        self.logical_len += logical_len;
        trace!(index, payload_len, logical_len, "emitted block");
        Ok(index)
    }

    /// Write the final tables: back-patched for seekable sinks, as a
    /// replacement head segment for segmented ones.
    pub(crate) fn finish(&mut self) -> Result<ContainerSummary> {
        if self.finished {
            return Err(XbcfError::InvalidOperation("container already closed".into()));
        }
        let logical = self.header.has_logical_table().then_some(&self.logical);
        let tables = encode_tables(&self.physical, logical)?;

        match &mut self.sink {
            OutputSink::Seekable(w) => {
                let end = w.stream_position()?;
                w.seek(SeekFrom::Start(self.base + HEADER_LEN as u64))?;
                w.write_all(&tables)?;
                w.seek(SeekFrom::Start(end))?;
                w.flush()?;
            }
            OutputSink::Segmented(s) => {
                let mut head = Vec::with_capacity(HEADER_LEN + tables.len());
                self.header.write(&mut head)?;
                head.extend_from_slice(&tables);
                s.replace_segment(0, &head)?;
            }
        }
        self.finished = true;

        let summary = ContainerSummary {
            level:        self.header.level,
            blocks:       self.physical.used(),
            logical_len:  self.logical_len,
            physical_len: self.header.head_len() + self.physical.total(),
        };
        debug!(?summary, "closed container");
        Ok(summary)
    }
}

impl Drop for Framer<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                level = self.header.level,
                blocks = self.physical.used(),
                "container dropped before close; its offset tables were never written"
            );
        }
    }
}

fn encode_tables(physical: &SizeTable, logical: Option<&SizeTable>) -> Result<Vec<u8>> {
    let mut tables = physical.encode()?;
    if let Some(logical) = logical {
        tables.extend_from_slice(&logical.encode()?);
    }
    Ok(tables)
}

fn zeroed_head(header: &Header) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(header.head_len() as usize);
    header.write(&mut head)?;
    head.resize(header.head_len() as usize, 0);
    Ok(head)
}

fn short_payload(copied: u64, expected: u64) -> XbcfError {
    XbcfError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("block payload ended after {copied} of {expected} bytes"),
    ))
}
