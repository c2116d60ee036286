//! Пример: запись синтетического filterbank файла через FilterbankWriter
//!
//! Демонстрирует:
//! - создание sigproc заголовка
//! - запись спектров блоками по времени
//! - чтение выборки обратно и поиск пика

use filbank_core::{Blob, FilbankConfig, FilterbankReader, FilterbankWriter, SelectionRequest};
use filbank_types::{Header, HeaderValue, Region, SampleFormat, Shape3};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_path = "filbank-core/test_output.fil";

    // --- Заголовок: 4096 каналов вниз от 8421 МГц ---
    let nchans = 4_096;
    let n_ints = 64;
    let mut header = Header::new_filterbank(8_421.0, -0.000_25, nchans, 59_000.0, 1.0, 32)?;
    header.insert("source_name", HeaderValue::Str("SYNTHETIC".into()));
    header.insert("telescope_id", HeaderValue::Int(6));

    let mut writer = FilterbankWriter::create(output_path, &header, n_ints)?;

    // --- Шум + узкая линия, дрейфующая по каналам ---
    let block = 16;
    for t0 in (0..n_ints).step_by(block) {
        let mut values = Vec::with_capacity(block * nchans);

        for t in t0..t0 + block {
            for c in 0..nchans {
                let noise = ((t * 31 + c * 17) % 97) as f32 / 97.0;
                let line = if c == 1_000 + t { 50.0 } else { 0.0 };
                values.push(10.0 + noise + line);
            }
        }

        let region = Region::new(Shape3::new(t0, 0, 0), Shape3::new(block, 1, nchans));
        writer.write_blob(&Blob::new(region, SampleFormat::Float32, SampleFormat::Float32.encode(&values)))?;

        println!("Integrations {t0}..{}: written", t0 + block);
    }

    writer.finish()?;

    // --- Чтение обратно ---
    let reader = FilterbankReader::open(output_path, &SelectionRequest::full(), &FilbankConfig::default())?;
    let sel = reader.read_selection()?;
    let spectrum = sel.spectrum(0, 0)?;

    let (peak, value) = spectrum
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });

    println!("\n✓ Записано: {output_path}");
    println!("  Shape    : {}", reader.file_shape());
    println!("  Peak     : {:.6} MHz ({value:.1})", sel.freqs[peak]);

    Ok(())
}
