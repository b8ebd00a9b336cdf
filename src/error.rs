use std::io;
use thiserror::Error;

use crate::codec::CodecError;

/// Every failure the container engine can surface.
///
/// None of these are retried or swallowed internally: each one reaches the
/// caller at the call that triggered it.
#[derive(Error, Debug)]
pub enum XbcfError {
    /// Bad format tag, unsupported cipher or an inconsistent header.
    #[error("Format error: {0}")]
    Format(String),
    #[error("Unsupported codec: {0:?}")]
    UnsupportedCodec(String),
    /// Offset table has the wrong length, decreases, or disagrees with the
    /// blocks it describes.
    #[error("Corrupt offset table: {0}")]
    CorruptTable(String),
    #[error("Offset table exhausted: capacity is {capacity} blocks")]
    TableExhausted { capacity: u64 },
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, XbcfError>;

impl From<XbcfError> for io::Error {
    fn from(err: XbcfError) -> Self {
        match err {
            XbcfError::Io(e) => e,
            XbcfError::InvalidOperation(_) | XbcfError::InvalidOptions(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
