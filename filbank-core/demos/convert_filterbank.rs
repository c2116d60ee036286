//! Пример: конвертация filterbank файла в чанковый контейнер и обратно
//!
//! Использование:
//! ```text
//! cargo run --example convert_filterbank -- input.fil [f_start f_stop]
//! ```

use std::path::PathBuf;

use filbank_core::{ConversionEngine, ConversionMode, FilbankConfig, SelectionRequest};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(args.next().ok_or("usage: convert_filterbank <file.fil> [f_start f_stop]")?);
    let f_start = args.next().map(|s| s.parse::<f64>()).transpose()?;
    let f_stop = args.next().map(|s| s.parse::<f64>()).transpose()?;

    let container = input.with_extension("fbc");
    let restored = input.with_extension("restored.fil");
    let request = SelectionRequest::full().with_freq(f_start, f_stop);

    let engine = ConversionEngine::new(FilbankConfig::default());

    let report = engine.convert_path(&input, &container, ConversionMode::FlatToChunked, &request)?;
    println!("{} -> {}", input.display(), container.display());
    println!("  Chunk    : {}", report.plan.chunk);
    println!("  Blob     : {} x {}", report.plan.blob, report.plan.count);
    println!("{}", report.metrics);

    // новый движок - свои метрики
    let engine = ConversionEngine::new(FilbankConfig::default());
    let report = engine.convert_path(
        &container,
        &restored,
        ConversionMode::ChunkedToFlat,
        &SelectionRequest::full(),
    )?;
    println!("{} -> {}", container.display(), restored.display());
    println!("{}", report.metrics);

    Ok(())
}
