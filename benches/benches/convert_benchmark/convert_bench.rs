use std::path::{Path, PathBuf};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use filbank_core::{
    container::encode_chunk, Blob, BlobPlan, ConversionEngine, FilbankConfig, FilterbankWriter,
    MemoryStore, SelectionRequest,
};
use filbank_types::{ChunkShape, Codec, Header, Region, SampleFormat, Shape3};
use rand::{rngs::StdRng, Rng, SeedableRng};

// =============================================================================
// Данные
// =============================================================================

const NCHANS: usize = 4096;
const N_INTS: usize = 256;

fn samples(n: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(7);
    // Шумовой пол с небольшим разбросом: типичная для u8 продуктов энтропия
    (0..n).map(|_| 96 + rng.gen_range(0..32u8)).collect()
}

fn write_fil(dir: &Path) -> PathBuf {
    let path = dir.join("bench.fil");
    let header = Header::new_filterbank(1500.0, -0.002_861, NCHANS, 59_000.0, 1.0, 8).unwrap();
    let shape = Shape3::new(N_INTS, 1, NCHANS);

    let mut w = FilterbankWriter::create(&path, &header, N_INTS).unwrap();
    w.write_blob(&Blob::new(
        Region::full(shape),
        SampleFormat::UInt8,
        samples(shape.len()),
    ))
    .unwrap();
    w.finish().unwrap();
    path
}

// =============================================================================
// Геометрия
// =============================================================================

fn bench_blob_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("blob_plan");
    let dataset = Shape3::new(16_384, 1, 1 << 26);

    for budget in [16usize, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(budget), &budget, |b, &mb| {
            b.iter(|| {
                BlobPlan::new(
                    black_box(ChunkShape::Auto),
                    dataset,
                    dataset,
                    4,
                    mb,
                )
            })
        });
    }

    group.finish();
}

// =============================================================================
// Кодеки чанков
// =============================================================================

fn bench_encode_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_chunk");
    let raw = samples(1 << 20);

    group.throughput(Throughput::Bytes(raw.len() as u64));

    for codec in [Codec::None, Codec::Lz4, Codec::ShuffleLz4] {
        group.bench_with_input(BenchmarkId::from_parameter(codec), &codec, |b, &codec| {
            b.iter(|| encode_chunk(codec, black_box(&raw), 1).unwrap())
        });
    }

    group.finish();
}

// =============================================================================
// Конвертация
// =============================================================================

fn bench_flat_to_container(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fil(dir.path());

    let mut group = c.benchmark_group("flat_to_container");
    group.throughput(Throughput::Bytes((N_INTS * NCHANS) as u64));
    group.sample_size(20);

    for blob_mb in [1usize, 16] {
        let config = FilbankConfig {
            blob_mb,
            ..FilbankConfig::default()
        };

        group.bench_with_input(BenchmarkId::from_parameter(blob_mb), &config, |b, config| {
            b.iter(|| {
                let engine = ConversionEngine::new(config.clone());
                engine
                    .flat_to_container(&path, MemoryStore::new(), &SelectionRequest::full())
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_blob_plan,
    bench_encode_chunk,
    bench_flat_to_container
);
criterion_main!(benches);
