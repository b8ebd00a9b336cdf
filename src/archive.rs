//! Path-based [`XbcfFile`] handle.
//!
//! ```no_run
//! use xbcf::archive::XbcfFile;
//! use xbcf::options::WriteOptions;
//!
//! // Write
//! let mut f = XbcfFile::create("out.xbcf", &WriteOptions::default())?;
//! f.write(b"Hello, world!")?;
//! f.close()?;
//!
//! // Read
//! let mut f = XbcfFile::open("out.xbcf")?;
//! f.seek(7)?;
//! assert_eq!(f.read(5)?, b"world");
//! # Ok::<(), xbcf::XbcfError>(())
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::error::{Result, XbcfError};
use crate::io_stream::{ContainerSummary, LeafWriter, NodeWriter, XbcfReader, READ_TO_END};
use crate::options::WriteOptions;
use crate::sink::OutputSink;

// ── FileMode ──────────────────────────────────────────────────────────────────

enum FileMode {
    Read(XbcfReader<BufReader<File>>),
    Write(LeafWriter<'static>),
    Assemble(NodeWriter<'static>),
    Closed,
}

impl FileMode {
    fn name(&self) -> &'static str {
        match self {
            FileMode::Read(_)     => "read",
            FileMode::Write(_)    => "write",
            FileMode::Assemble(_) => "assemble",
            FileMode::Closed      => "closed",
        }
    }
}

// ── XbcfFile ──────────────────────────────────────────────────────────────────

/// One container file opened in exactly one mode.
///
/// Operations that do not fit the mode fail with
/// [`XbcfError::InvalidOperation`] instead of touching the file.
pub struct XbcfFile {
    path: PathBuf,
    mode: FileMode,
}

impl XbcfFile {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let reader = XbcfReader::open(BufReader::new(File::open(&path)?))?;
        Ok(Self { path, mode: FileMode::Read(reader) })
    }

    /// Create a leaf container.
    pub fn create<P: AsRef<Path>>(path: P, options: &WriteOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let sink = OutputSink::seekable(BufWriter::new(File::create(&path)?));
        let writer = LeafWriter::create(sink, options)?;
        Ok(Self { path, mode: FileMode::Write(writer) })
    }

    /// Create a level `level` container to be filled with [`add_child`].
    ///
    /// [`add_child`]: XbcfFile::add_child
    pub fn create_node<P: AsRef<Path>>(path: P, level: u64, options: &WriteOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let sink = OutputSink::seekable(BufWriter::new(File::create(&path)?));
        let writer = NodeWriter::create(sink, level, options)?;
        Ok(Self { path, mode: FileMode::Assemble(writer) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Write ─────────────────────────────────────────────────────────────────

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.mode {
            FileMode::Write(w) => w.write_bytes(data),
            other => Err(wrong_mode("write", other)),
        }
    }

    /// Append a finished child container file.
    pub fn add_child<P: AsRef<Path>>(&mut self, child: P) -> Result<()> {
        match &mut self.mode {
            FileMode::Assemble(n) => n.add_child(BufReader::new(File::open(child)?)),
            other => Err(wrong_mode("add a child", other)),
        }
    }

    /// Finalise a file opened for writing.  Closing a reader just releases
    /// it and returns `None`.
    pub fn close(&mut self) -> Result<Option<ContainerSummary>> {
        match std::mem::replace(&mut self.mode, FileMode::Closed) {
            FileMode::Write(w)    => w.close().map(Some),
            FileMode::Assemble(n) => n.close().map(Some),
            FileMode::Read(_)     => Ok(None),
            FileMode::Closed      => Err(wrong_mode("close", &FileMode::Closed)),
        }
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    pub fn len(&self) -> Result<u64> {
        Ok(self.reader()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.reader()?.is_empty())
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.reader_mut("seek")?.seek_to(pos)
    }

    pub fn tell(&self) -> Result<u64> {
        Ok(self.reader()?.position())
    }

    pub fn read(&mut self, length: u64) -> Result<Vec<u8>> {
        self.reader_mut("read")?.read_bytes(length)
    }

    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        self.read(READ_TO_END)
    }

    fn reader(&self) -> Result<&XbcfReader<BufReader<File>>> {
        match &self.mode {
            FileMode::Read(r) => Ok(r),
            other => Err(wrong_mode("inspect", other)),
        }
    }

    fn reader_mut(&mut self, op: &str) -> Result<&mut XbcfReader<BufReader<File>>> {
        match &mut self.mode {
            FileMode::Read(r) => Ok(r),
            other => Err(wrong_mode(op, other)),
        }
    }
}

fn wrong_mode(op: &str, mode: &FileMode) -> XbcfError {
    XbcfError::InvalidOperation(format!("cannot {op} a container opened in {} mode", mode.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.xbcf");
        let opts = WriteOptions::default().with_block_size(4);

        let mut f = XbcfFile::create(&path, &opts).unwrap();
        f.write(b"Hello, ").unwrap();
        f.write(b"world!").unwrap();
        let summary = f.close().unwrap().unwrap();
        assert_eq!(summary.logical_len, 13);
        assert_eq!(summary.blocks, 4);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), summary.physical_len);

        let mut f = XbcfFile::open(&path).unwrap();
        assert_eq!(f.len().unwrap(), 13);
        f.seek(7).unwrap();
        assert_eq!(f.read(5).unwrap(), b"world");
        assert_eq!(f.tell().unwrap(), 12);
        assert_eq!(f.read_to_end().unwrap(), b"!");
    }

    #[test]
    fn operations_are_checked_against_the_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modes.xbcf");

        let mut f = XbcfFile::create(&path, &WriteOptions::default()).unwrap();
        assert!(matches!(f.seek(0), Err(XbcfError::InvalidOperation(_))));
        assert!(matches!(f.read(1), Err(XbcfError::InvalidOperation(_))));
        assert!(matches!(f.add_child(&path), Err(XbcfError::InvalidOperation(_))));
        f.write(b"abc").unwrap();
        f.close().unwrap();
        assert!(matches!(f.write(b"more"), Err(XbcfError::InvalidOperation(_))));
        assert!(matches!(f.close(), Err(XbcfError::InvalidOperation(_))));

        let mut f = XbcfFile::open(&path).unwrap();
        assert!(matches!(f.write(b"x"), Err(XbcfError::InvalidOperation(_))));
        assert_eq!(f.close().unwrap(), None);
    }

    #[test]
    fn node_file_from_child_files() {
        let dir = tempdir().unwrap();
        let opts = WriteOptions::default().with_block_size(5).with_table_size(8);
        let parts: [&[u8]; 3] = [b"first part|", b"", b"third"];

        let mut child_paths = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let p = dir.path().join(format!("part{i}.xbcf"));
            let mut f = XbcfFile::create(&p, &opts).unwrap();
            f.write(part).unwrap();
            f.close().unwrap();
            child_paths.push(p);
        }

        let node_path = dir.path().join("all.xbcf");
        let mut node = XbcfFile::create_node(&node_path, 1, &opts).unwrap();
        for p in &child_paths {
            node.add_child(p).unwrap();
        }
        let summary = node.close().unwrap().unwrap();
        assert_eq!(summary.blocks, 3);

        let mut f = XbcfFile::open(&node_path).unwrap();
        assert_eq!(f.read_to_end().unwrap(), b"first part|third");
    }
}
