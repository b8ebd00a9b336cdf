//! Property-based tests for stream reconstruction and random access.

use proptest::prelude::*;
use std::io::Cursor;
use xbcf::{assemble, build_leaf, CodecTag, OutputSink, WriteOptions, XbcfReader};

fn codec() -> impl Strategy<Value = CodecTag> {
    prop_oneof![
        Just(CodecTag::LZ4),
        Just(CodecTag::ZSTD),
        Just(CodecTag::RAW),
    ]
}

/// Leaves for `parts`, assembled into one level 1 container.
fn node_of(parts: &[Vec<u8>], opts: &WriteOptions) -> Vec<u8> {
    let leaves: Vec<Vec<u8>> = parts.iter().map(|p| build_leaf(p, opts).unwrap()).collect();
    let mut out = Cursor::new(Vec::new());
    assemble(&leaves, 1, OutputSink::seekable(&mut out), opts).unwrap();
    out.into_inner()
}

proptest! {
    #[test]
    fn prop_leaf_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..8_000),
        block_size in 16u64..4096,
        codec in codec(),
    ) {
        let opts = WriteOptions::default()
            .with_block_size(block_size)
            .with_table_size(1024)
            .with_codec(codec);
        let bytes = build_leaf(&data, &opts).unwrap();
        let mut reader = XbcfReader::open(Cursor::new(bytes)).unwrap();
        prop_assert_eq!(reader.len(), data.len() as u64);
        prop_assert_eq!(reader.block_count() as u64, (data.len() as u64).div_ceil(block_size));
        prop_assert_eq!(reader.read_remaining().unwrap(), data);
    }

    #[test]
    fn prop_seek_then_read_matches_slice(
        data in proptest::collection::vec(any::<u8>(), 1..8_000),
        block_size in 8u64..1024,
        probes in proptest::collection::vec((any::<prop::sample::Index>(), 0u64..3_000), 1..16),
    ) {
        let opts = WriteOptions::default().with_block_size(block_size).with_table_size(1024);
        let bytes = build_leaf(&data, &opts).unwrap();
        let mut reader = XbcfReader::open(Cursor::new(bytes)).unwrap();

        for (at, len) in probes {
            let pos = at.index(data.len());
            reader.seek_to(pos as u64).unwrap();
            let got = reader.read_bytes(len).unwrap();
            let end = (pos + len as usize).min(data.len());
            prop_assert_eq!(got.as_slice(), &data[pos..end]);
            prop_assert_eq!(reader.position(), end as u64);
        }
    }

    #[test]
    fn prop_node_concatenates_children(
        parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..600), 1..12),
        block_size in 4u64..256,
        chunk in 1u64..500,
    ) {
        let opts = WriteOptions::default().with_block_size(block_size).with_table_size(1024);
        let bytes = node_of(&parts, &opts);
        let expected = parts.concat();

        let mut reader = XbcfReader::open(Cursor::new(bytes)).unwrap();
        prop_assert_eq!(reader.len(), expected.len() as u64);
        prop_assert_eq!(reader.block_count(), parts.len());

        let mut got = Vec::new();
        loop {
            let piece = reader.read_bytes(chunk).unwrap();
            if piece.is_empty() {
                break;
            }
            got.extend_from_slice(&piece);
        }
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_node_random_access(
        parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..300), 1..8),
        probes in proptest::collection::vec((any::<prop::sample::Index>(), 1u64..700), 1..10),
    ) {
        let opts = WriteOptions::default().with_block_size(64).with_table_size(64);
        let expected = parts.concat();
        prop_assume!(!expected.is_empty());

        let mut reader = XbcfReader::open(Cursor::new(node_of(&parts, &opts))).unwrap();
        for (at, len) in probes {
            let pos = at.index(expected.len());
            reader.seek_to(pos as u64).unwrap();
            let got = reader.read_bytes(len).unwrap();
            let end = (pos + len as usize).min(expected.len());
            prop_assert_eq!(got.as_slice(), &expected[pos..end]);
        }
    }
}
