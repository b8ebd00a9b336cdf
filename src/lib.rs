pub mod error;
pub mod header;
pub mod codec;
pub mod table;
pub mod block;
pub mod sink;
pub mod options;
pub mod io_stream;
pub mod archive;
pub mod perf;

pub use error::{Result, XbcfError};
pub use header::Header;
pub use codec::{Codec, CodecRegistry, CodecTag};
pub use sink::{OutputSink, SegmentBuffer, SegmentSink};
pub use options::WriteOptions;
pub use io_stream::{build_leaf, assemble, ContainerSummary, LeafWriter, NodeWriter, XbcfReader, READ_TO_END};
pub use archive::XbcfFile;
