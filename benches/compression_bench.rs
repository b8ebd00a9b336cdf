use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;
use xbcf::codec::{Codec, Lz4Codec, ZstdCodec};
use xbcf::perf::build_leaves;
use xbcf::{assemble, build_leaf, CodecTag, OutputSink, WriteOptions, XbcfReader};

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31) ^ (i >> 7)) as u8).collect()
}

fn bench_compression(c: &mut Criterion) {
    let data = sample(1024 * 1024);
    let zstd = ZstdCodec;
    let lz4 = Lz4Codec;

    c.bench_function("zstd_compress_1mb", |b| b.iter(|| zstd.compress(black_box(&data), 3)));
    c.bench_function("lz4_compress_1mb", |b| b.iter(|| lz4.compress(black_box(&data), 0)));
}

fn bench_build_leaf(c: &mut Criterion) {
    let data = sample(8 * 1024 * 1024);

    for (name, codec) in [("leaf_8mb_lz4", CodecTag::LZ4), ("leaf_8mb_zstd", CodecTag::ZSTD)] {
        let opts = WriteOptions::default().with_codec(codec);
        c.bench_function(name, |b| b.iter(|| build_leaf(black_box(&data), &opts).unwrap()));
    }
}

fn bench_assemble_parts(c: &mut Criterion) {
    let data = sample(16 * 1024 * 1024);
    let opts = WriteOptions::default();
    let chunks: Vec<&[u8]> = data.chunks(4 * 1024 * 1024).collect();

    c.bench_function("assemble_4x4mb", |b| {
        b.iter(|| {
            let leaves = build_leaves(black_box(&chunks), &opts).unwrap();
            let mut out = Cursor::new(Vec::new());
            assemble(&leaves, 1, OutputSink::seekable(&mut out), &opts).unwrap();
        })
    });
}

fn bench_random_read(c: &mut Criterion) {
    let data = sample(8 * 1024 * 1024);
    let bytes = build_leaf(&data, &WriteOptions::default()).unwrap();

    c.bench_function("random_read_4kb", |b| {
        let mut reader = XbcfReader::open(Cursor::new(&bytes)).unwrap();
        let mut pos = 0u64;
        b.iter(|| {
            pos = (pos + 1_234_567) % (data.len() as u64 - 4096);
            reader.seek_to(black_box(pos)).unwrap();
            reader.read_bytes(4096).unwrap()
        })
    });
}

criterion_group!(benches, bench_compression, bench_build_leaf, bench_assemble_parts, bench_random_read);
criterion_main!(benches);
