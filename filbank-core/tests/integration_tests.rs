use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use filbank_core::{
    container::{BlobStore, MemoryStore},
    ConversionEngine, ConversionMode, FilbankConfig, FilterbankContainer, FilterbankReader,
    FilterbankWriter, SelectionRequest,
};
use filbank_types::{Codec, FilbankError, Header, HeaderValue, Region, SampleFormat, Shape3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::TempDir;

// ===========================================================================
// Helpers - детерминированные тест-данные
// ===========================================================================

fn test_header(
    fch1: f64,
    foff: f64,
    nchans: usize,
    nbits: u32,
) -> Header {
    let mut h = Header::new_filterbank(fch1, foff, nchans, 57_650.782_094_907_4, 18.253_611_008, nbits).unwrap();

    h.insert("source_name", HeaderValue::Str("Voyager1".into()));
    h.insert("telescope_id", HeaderValue::Int(6));
    h.insert("machine_id", HeaderValue::Int(10));
    h.insert("src_raj", HeaderValue::Angle(filbank_types::Angle(171_010.0)));
    h.insert("src_dej", HeaderValue::Angle(filbank_types::Angle(120_633.0)));
    h
}

/// Случайные отсчёты `n_ints x nchans` для заголовка (seed фиксирован).
fn random_samples(
    header: &Header,
    n_ints: usize,
    seed: u64,
) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = n_ints * header.nchans().unwrap() * header.nifs().unwrap();

    match header.sample_format().unwrap() {
        SampleFormat::UInt8 => (0..n).map(|_| rng.gen::<u8>()).collect(),
        SampleFormat::UInt16 => (0..n).flat_map(|_| rng.gen::<u16>().to_le_bytes()).collect(),
        SampleFormat::Float32 => (0..n)
            .flat_map(|_| rng.gen_range(0.0f32..1.0e6).to_le_bytes())
            .collect(),
    }
}

fn write_fil(
    path: &Path,
    header: &Header,
    n_ints: usize,
    data: &[u8],
) {
    let mut w = FilterbankWriter::create(path, header, n_ints).unwrap();
    let shape = Shape3::new(n_ints, header.nifs().unwrap(), header.nchans().unwrap());
    let blob = filbank_core::Blob::new(
        Region::full(shape),
        header.sample_format().unwrap(),
        data.to_vec(),
    );

    w.write_blob(&blob).unwrap();
    w.finish().unwrap();
}

/// Байты данных файла (без заголовка).
fn data_bytes(path: &Path) -> Vec<u8> {
    let r = FilterbankReader::open(path, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap();
    let raw = std::fs::read(path).unwrap();

    raw[r.header_len() as usize..].to_vec()
}

fn small_blob_config() -> FilbankConfig {
    FilbankConfig {
        blob_mb: 1,
        ..FilbankConfig::default()
    }
}

/// flat -> контейнер в памяти -> flat; возвращает путь результата.
fn round_trip(
    dir: &TempDir,
    input: &Path,
    config: FilbankConfig,
) -> (PathBuf, MemoryStore) {
    let engine = ConversionEngine::new(config);
    let output = dir.path().join("back.fil");

    let (report, store) = engine
        .flat_to_container(input, MemoryStore::new(), &SelectionRequest::full())
        .unwrap();
    assert_eq!(report.mode, ConversionMode::FlatToChunked);
    assert_eq!(report.blobs, report.plan.count);

    engine
        .container_to_flat(store.clone(), &output, &SelectionRequest::full())
        .unwrap();

    (output, store)
}

// ===========================================================================
// Оси и выборки
// ===========================================================================

#[test]
fn test_descending_axis_example() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("desc.fil");
    let header = test_header(1420.0, -0.5, 4, 8);
    write_fil(&path, &header, 2, &random_samples(&header, 2, 1));

    let full = FilterbankReader::open(&path, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap();
    assert_eq!(full.freqs(), &[1418.5, 1419.0, 1419.5, 1420.0]);

    let req = SelectionRequest::full().with_freq(Some(1419.0), Some(1420.0));
    let r = FilterbankReader::open(&path, &req, &FilbankConfig::default()).unwrap();
    assert_eq!(r.selection().freq, 0..2);
    assert_eq!(r.freqs(), &[1419.5, 1420.0]);
}

#[test]
fn test_out_of_range_and_empty_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.fil");
    let header = test_header(1000.0, 1.0, 8, 8);
    write_fil(&path, &header, 4, &random_samples(&header, 4, 2));

    let outside = SelectionRequest::full().with_freq(Some(2000.0), Some(2100.0));
    assert!(matches!(
        FilterbankReader::open(&path, &outside, &FilbankConfig::default()),
        Err(FilbankError::OutOfRange { .. })
    ));

    let empty = SelectionRequest::full().with_time(Some(2), Some(2));
    assert!(matches!(
        FilterbankReader::open(&path, &empty, &FilbankConfig::default()),
        Err(FilbankError::EmptySelection { .. })
    ));
}

// ===========================================================================
// Конвертация
// ===========================================================================

#[test]
fn test_round_trip_descending_u8_multi_blob() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");
    let header = test_header(8421.386_717_353_016, -2.793_967_723_846_435_5e-6, 2048, 8);
    let data = random_samples(&header, 600, 42);
    write_fil(&input, &header, 600, &data);

    let engine = ConversionEngine::new(small_blob_config());
    let (report, store) = engine
        .flat_to_container(&input, MemoryStore::new(), &SelectionRequest::full())
        .unwrap();

    assert_eq!(report.plan.blob, Shape3::new(512, 1, 2048));
    assert_eq!(report.blobs, 2);
    assert_eq!(report.metrics.bytes_read, 600 * 2048);

    let output = dir.path().join("out.fil");
    engine
        .container_to_flat(store, &output, &SelectionRequest::full())
        .unwrap();

    assert_eq!(data_bytes(&output), data);

    let a = FilterbankReader::open(&input, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap();
    let b = FilterbankReader::open(&output, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap();

    for (x, y) in a.freqs().iter().zip(b.freqs()) {
        assert_abs_diff_eq!(x, y, epsilon = 1e-9);
    }
    for (x, y) in a.timestamps().iter().zip(b.timestamps()) {
        assert_abs_diff_eq!(x, y, epsilon = 1e-9);
    }
    assert_eq!(b.header().foff().unwrap(), header.foff().unwrap());
    assert_eq!(b.header().source_name(), Some("Voyager1"));
}

#[test]
fn test_round_trip_ascending_u16() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");
    let header = test_header(1100.0, 0.125, 96, 16);
    let data = random_samples(&header, 37, 7);
    write_fil(&input, &header, 37, &data);

    let (output, store) = round_trip(&dir, &input, FilbankConfig::default());

    assert_eq!(data_bytes(&output), data);
    assert!(store.contains("data/.attrs.json").unwrap());
    // флагов нет - маска без чанков
    assert!(store.list("mask/c/").unwrap().is_empty());
}

#[test]
fn test_round_trip_through_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");
    let container = dir.path().join("in.fbc");
    let output = dir.path().join("out.fil");

    let header = test_header(1500.0, -0.25, 64, 32);
    let data = random_samples(&header, 16, 11);
    write_fil(&input, &header, 16, &data);

    let engine = ConversionEngine::new(FilbankConfig::default());
    let report = engine
        .convert_path(&input, &container, ConversionMode::FlatToChunked, &SelectionRequest::full())
        .unwrap();

    assert_eq!(report.codec, Some(filbank_core::container::effective_codec(Codec::ShuffleLz4)));
    assert!(container.join(".attrs.json").is_file());
    assert!(container.join("data/c/0.0.0").is_file());

    engine
        .convert_path(&container, &output, ConversionMode::ChunkedToFlat, &SelectionRequest::full())
        .unwrap();

    assert_eq!(data_bytes(&output), data);
}

#[test]
fn test_sub_selection_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");
    let header = test_header(1500.0, -0.25, 64, 8);
    let data = random_samples(&header, 16, 3);
    write_fil(&input, &header, 16, &data);

    // каналы 20..40, интеграции 3..10
    let req = SelectionRequest::full()
        .with_freq(Some(1490.0), Some(1495.0))
        .with_time(Some(3), Some(10));

    let engine = ConversionEngine::new(FilbankConfig::default());
    let (_, store) = engine
        .flat_to_container(&input, MemoryStore::new(), &req)
        .unwrap();

    let output = dir.path().join("sub.fil");
    engine
        .container_to_flat(store, &output, &SelectionRequest::full())
        .unwrap();

    let expected: Vec<u8> = (3..10)
        .flat_map(|t| data[t * 64 + 20..t * 64 + 40].to_vec())
        .collect();
    assert_eq!(data_bytes(&output), expected);

    let r = FilterbankReader::open(&output, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap();
    let h = r.header();

    assert_eq!(h.fch1().unwrap(), 1495.0);
    assert_eq!(h.foff().unwrap(), -0.25);
    assert_eq!(h.nchans().unwrap(), 20);
    assert_eq!(h.get("nsamples"), Some(&HeaderValue::Int(7)));
    assert_abs_diff_eq!(
        h.tstart().unwrap(),
        header.tstart().unwrap() + 3.0 * header.tsamp().unwrap() / 86_400.0,
        epsilon = 1e-12
    );
}

#[test]
fn test_container_selection_matches_flat() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");
    let header = test_header(1500.0, -0.25, 64, 16);
    write_fil(&input, &header, 12, &random_samples(&header, 12, 5));

    let engine = ConversionEngine::new(FilbankConfig::default());
    let (_, store) = engine
        .flat_to_container(&input, MemoryStore::new(), &SelectionRequest::full())
        .unwrap();

    let req = SelectionRequest::full()
        .with_freq(Some(1486.3), Some(1493.1))
        .with_time(Some(2), Some(9));

    let flat = FilterbankReader::open(&input, &req, &FilbankConfig::default())
        .unwrap()
        .read_selection()
        .unwrap();
    let chunked = FilterbankContainer::open(store, &req, &FilbankConfig::default())
        .unwrap()
        .read_selection()
        .unwrap();

    assert_eq!(flat.data, chunked.data);
    assert_eq!(flat.freqs, chunked.freqs);
    assert_eq!(flat.timestamps, chunked.timestamps);
    assert!(flat.freqs.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_corrupted_chunk_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");
    let header = test_header(1000.0, 1.0, 32, 8);
    write_fil(&input, &header, 8, &random_samples(&header, 8, 9));

    let engine = ConversionEngine::new(FilbankConfig::default());
    let (_, store) = engine
        .flat_to_container(&input, MemoryStore::new(), &SelectionRequest::full())
        .unwrap();

    let key = store.list("data/c/").unwrap()[0].clone();
    let mut frame = store.get(&key).unwrap().unwrap();
    frame[4] ^= 0x5A;
    store.set(&key, &frame).unwrap();

    let err = engine
        .container_to_flat(store, &dir.path().join("out.fil"), &SelectionRequest::full())
        .unwrap_err();

    assert!(matches!(err, FilbankError::Corrupted(_)));
    assert!(err.to_string().contains(&key), "{err}");
}

#[test]
fn test_blank_dc_during_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");

    // 16 каналов = 2 грубых канала по 2.9296875 МГц, по убыванию частоты
    let foff = -2.0 * 2.929_687_5 / 16.0;
    let header = test_header(1500.0, foff, 16, 32);

    // DC-бины по возрастанию: 3 и 11 -> в порядке файла 12 и 4
    let mut row = vec![1.0f32; 16];
    row[12] = 100.0;
    row[4] = 100.0;
    let values: Vec<f32> = (0..4).flat_map(|_| row.clone()).collect();
    write_fil(&input, &header, 4, &SampleFormat::Float32.encode(&values));

    // по умолчанию конвертация ничего не меняет
    let engine = ConversionEngine::new(FilbankConfig::default());
    let (_, store) = engine
        .flat_to_container(&input, MemoryStore::new(), &SelectionRequest::full())
        .unwrap();
    let sel = FilterbankContainer::open(store, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap()
        .read_selection()
        .unwrap();
    assert_eq!(sel.data[[0, 0, 3]], 100.0);

    let engine = ConversionEngine::new(FilbankConfig {
        blank_dc: true,
        ..FilbankConfig::default()
    });
    let (_, store) = engine
        .flat_to_container(&input, MemoryStore::new(), &SelectionRequest::full())
        .unwrap();
    let sel = FilterbankContainer::open(store, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap()
        .read_selection()
        .unwrap();

    assert!(sel.data.iter().all(|&v| v == 1.0));
}

#[test]
fn test_in_memory_dc_blanking_and_spectrum() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fil");
    let header = test_header(1500.0, 2.929_687_5 / 8.0, 16, 32);

    let mut values = vec![2.0f32; 2 * 16];
    values[3] = 50.0;
    values[16 + 11] = 70.0;
    write_fil(&input, &header, 2, &SampleFormat::Float32.encode(&values));

    let r = FilterbankReader::open(&input, &SelectionRequest::full(), &FilbankConfig::default())
        .unwrap();
    let mut sel = r.read_selection().unwrap();

    assert_abs_diff_eq!(sel.bandwidth_mhz(), 2.0 * 2.929_687_5, epsilon = 1e-12);
    let n_coarse = sel.coarse_channels(FilbankConfig::default().coarse_channel_bw_mhz);
    assert_eq!(n_coarse, 2);

    sel.blank_dc(n_coarse).unwrap();

    assert!(sel.spectrum(0, 0).unwrap().iter().all(|&v| v == 2.0));
    assert!(sel.mean_spectrum(0).iter().all(|&v| v == 2.0));
    assert!(matches!(
        sel.spectrum(5, 0),
        Err(FilbankError::OutOfRange { .. })
    ));
}
