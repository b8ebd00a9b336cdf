//! Output sinks.
//!
//! A container is written either to a seekable destination, where the
//! offset tables are back-patched in place at close, or to an append-only
//! segmented destination (multipart object uploads and the like), where the
//! head segment is emitted first with empty tables and replaced at close.

use std::io::{self, Seek, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCapability {
    SeekableRandomWrite,
    AppendOnlySegmented,
}

/// `Write + Seek` as one object-safe trait.
pub trait WriteSeek: Write + Seek {}
impl<T: Write + Seek> WriteSeek for T {}

/// Append-only destination made of numbered segments.
///
/// Segments are appended with consecutive indices starting at 0.
/// `replace_segment` is only ever called for segment 0, once, at close.
pub trait SegmentSink {
    fn append_segment(&mut self, index: usize, bytes: &[u8]) -> io::Result<()>;
    fn replace_segment(&mut self, index: usize, bytes: &[u8]) -> io::Result<()>;
}

impl<S: SegmentSink + ?Sized> SegmentSink for &mut S {
    fn append_segment(&mut self, index: usize, bytes: &[u8]) -> io::Result<()> {
        (**self).append_segment(index, bytes)
    }
    fn replace_segment(&mut self, index: usize, bytes: &[u8]) -> io::Result<()> {
        (**self).replace_segment(index, bytes)
    }
}

pub enum OutputSink<'a> {
    Seekable(Box<dyn WriteSeek + 'a>),
    Segmented(Box<dyn SegmentSink + 'a>),
}

impl<'a> OutputSink<'a> {
    pub fn seekable<W: Write + Seek + 'a>(writer: W) -> Self {
        OutputSink::Seekable(Box::new(writer))
    }

    pub fn segmented<S: SegmentSink + 'a>(sink: S) -> Self {
        OutputSink::Segmented(Box::new(sink))
    }

    pub fn capability(&self) -> SinkCapability {
        match self {
            OutputSink::Seekable(_)  => SinkCapability::SeekableRandomWrite,
            OutputSink::Segmented(_) => SinkCapability::AppendOnlySegmented,
        }
    }
}

/// In-memory segment store.
#[derive(Debug, Default, Clone)]
pub struct SegmentBuffer {
    segments: Vec<Vec<u8>>,
    replaced: usize,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// How many times a segment has been replaced.
    pub fn replacements(&self) -> usize {
        self.replaced
    }

    /// Concatenate all segments in index order.
    pub fn into_bytes(self) -> Vec<u8> {
        self.segments.concat()
    }
}

impl SegmentSink for SegmentBuffer {
    fn append_segment(&mut self, index: usize, bytes: &[u8]) -> io::Result<()> {
        if index != self.segments.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!(
                "segment {index} appended out of order (next is {})", self.segments.len()
            )));
        }
        self.segments.push(bytes.to_vec());
        Ok(())
    }

    fn replace_segment(&mut self, index: usize, bytes: &[u8]) -> io::Result<()> {
        let slot = self.segments.get_mut(index).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("segment {index} was never appended"))
        })?;
        *slot = bytes.to_vec();
        self.replaced += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_must_be_consecutive() {
        let mut buf = SegmentBuffer::new();
        buf.append_segment(0, b"head").unwrap();
        buf.append_segment(1, b"body").unwrap();
        assert!(buf.append_segment(3, b"gap").is_err());
        buf.replace_segment(0, b"HEAD").unwrap();
        assert!(buf.replace_segment(5, b"x").is_err());
        assert_eq!(buf.replacements(), 1);
        assert_eq!(buf.into_bytes(), b"HEADbody");
    }

    #[test]
    fn capability_follows_variant() {
        let mut cur = io::Cursor::new(Vec::new());
        assert_eq!(OutputSink::seekable(&mut cur).capability(), SinkCapability::SeekableRandomWrite);
        let mut segs = SegmentBuffer::new();
        assert_eq!(OutputSink::segmented(&mut segs).capability(), SinkCapability::AppendOnlySegmented);
    }
}
