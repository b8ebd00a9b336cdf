//! Parallel production of child containers.
//!
//! # Parallel leaves
//!
//! [`build_leaves`] turns independent chunks of a logical stream into
//! complete leaf containers concurrently using Rayon.  Each worker owns its
//! own container outright; the results come back in input order, ready to
//! be handed to a [`NodeWriter`](crate::io_stream::NodeWriter) one by one.
//!
//! Without the `parallel` feature the same work runs sequentially.

use crate::error::Result;
use crate::io_stream::{assemble, build_leaf, ContainerSummary};
use crate::options::WriteOptions;
use crate::sink::OutputSink;

/// Build one leaf container per chunk, preserving order.
///
/// If any chunk fails, the first error is returned and the remaining
/// results are discarded.
pub fn build_leaves(chunks: &[&[u8]], options: &WriteOptions) -> Result<Vec<Vec<u8>>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        chunks
            .par_iter()
            .map(|chunk| build_leaf(chunk, options))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        chunks.iter().map(|chunk| build_leaf(chunk, options)).collect()
    }
}

/// Split `data` into `part_size` pieces, build a leaf per piece and
/// assemble them into a level 1 container on `sink`.
pub fn pack_parts(
    data:      &[u8],
    part_size: usize,
    sink:      OutputSink<'_>,
    options:   &WriteOptions,
) -> Result<ContainerSummary> {
    let chunks: Vec<&[u8]> = data.chunks(part_size.max(1)).collect();
    let leaves = build_leaves(&chunks, options)?;
    assemble(&leaves, 1, sink, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_stream::XbcfReader;
    use crate::sink::SegmentBuffer;
    use std::io::Cursor;

    #[test]
    fn leaves_come_back_in_order() {
        let opts = WriteOptions::default().with_block_size(8).with_table_size(4);
        let chunks: Vec<&[u8]> = vec![b"aaaa", b"bbbbbbbbbbbb", b"", b"c"];
        let leaves = build_leaves(&chunks, &opts).unwrap();
        assert_eq!(leaves.len(), 4);
        for (leaf, chunk) in leaves.iter().zip(&chunks) {
            let mut r = XbcfReader::open(Cursor::new(leaf)).unwrap();
            assert_eq!(r.read_remaining().unwrap(), *chunk);
        }
    }

    #[test]
    fn pack_parts_on_segmented_sink() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let opts = WriteOptions::default().with_block_size(512).with_table_size(8);
        let mut segments = SegmentBuffer::new();
        let summary = pack_parts(&data, 3000, OutputSink::segmented(&mut segments), &opts).unwrap();
        assert_eq!(summary.blocks, 4);
        assert_eq!(summary.logical_len, data.len() as u64);
        // head + one segment per part
        assert_eq!(segments.segments().len(), 5);

        let mut r = XbcfReader::open(Cursor::new(segments.into_bytes())).unwrap();
        assert_eq!(r.read_remaining().unwrap(), data);
    }
}
