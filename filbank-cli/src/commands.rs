//! Команды `filbank`: `info`, `convert`, `spectrum`.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
};

use filbank_core::{
    BlobSource, ConversionEngine, ConversionReport, DataSelection, FilbankConfig,
    FilesystemStore, FilterbankContainer, FilterbankReader, SelectionRequest,
};
use log::{info, warn};

use crate::{default_output, CliError, CliResult, InputKind};

/// Открытый вход: плоский файл или контейнер.
pub enum Input {
    Flat(FilterbankReader),
    Container(FilterbankContainer<FilesystemStore>),
}

/// Параметры команды `convert`.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Целевой вид; `None` - противоположный входу
    pub target: Option<InputKind>,
    pub selection: SelectionRequest,
}

/// Параметры команды `spectrum`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectrumOptions {
    /// Усреднить по времени вместо первой интеграции выборки
    pub average: bool,
    /// Не убирать DC-бины
    pub keep_dc: bool,
}

impl Input {
    pub fn open(
        path: &Path,
        request: &SelectionRequest,
        config: &FilbankConfig,
    ) -> CliResult<Self> {
        let input = match InputKind::detect(path) {
            InputKind::Flat => Input::Flat(FilterbankReader::open(path, request, config)?),
            InputKind::Container => Input::Container(FilterbankContainer::open(
                FilesystemStore::open(path)?,
                request,
                config,
            )?),
        };

        Ok(input)
    }

    pub fn kind(&self) -> InputKind {
        match self {
            Input::Flat(_) => InputKind::Flat,
            Input::Container(_) => InputKind::Container,
        }
    }

    pub fn source(&self) -> &dyn BlobSource {
        match self {
            Input::Flat(r) => r,
            Input::Container(c) => c,
        }
    }

    pub fn read_selection(&self) -> CliResult<DataSelection> {
        let sel = match self {
            Input::Flat(r) => r.read_selection()?,
            Input::Container(c) => c.read_selection()?,
        };

        Ok(sel)
    }
}

/// `filbank info`: поля заголовка и производные величины.
pub fn run_info<W: Write>(
    path: &Path,
    request: &SelectionRequest,
    config: &FilbankConfig,
    out: &mut W,
) -> CliResult<()> {
    let input = Input::open(path, request, config)?;

    writeln!(out, "--- {} ({}) ---", path.display(), input.kind())?;
    for (key, value) in input.source().info_lines() {
        writeln!(out, "{key:<16}: {value}")?;
    }

    Ok(())
}

/// `filbank convert`.
pub fn run_convert(
    request: &ConvertRequest,
    config: &FilbankConfig,
    stop_flag: Arc<AtomicBool>,
) -> CliResult<ConversionReport> {
    let kind = InputKind::detect(&request.input);

    if request.target == Some(kind) {
        return Err(CliError::AlreadyConverted {
            path: request.input.display().to_string(),
            kind: kind.to_string(),
        });
    }

    let mode = kind.conversion_mode();
    let output = request
        .output
        .clone()
        .unwrap_or_else(|| default_output(&request.input, mode));

    info!(
        "{} -> {} ({mode:?}, codec {}, blob {} MiB)",
        request.input.display(),
        output.display(),
        config.codec,
        config.blob_mb
    );

    let engine = ConversionEngine::with_stop_flag(config.clone(), stop_flag);
    let report = engine.convert_path(&request.input, &output, mode, &request.selection)?;

    if report.interrupted {
        warn!("Conversion interrupted, {} is incomplete", output.display());
    }

    Ok(report)
}

/// `filbank spectrum`: строки `freq value` по возрастанию частоты.
pub fn run_spectrum<W: Write>(
    path: &Path,
    request: &SelectionRequest,
    config: &FilbankConfig,
    options: SpectrumOptions,
    out: &mut W,
) -> CliResult<()> {
    let input = Input::open(path, request, config)?;
    let mut sel = input.read_selection()?;

    if !options.keep_dc {
        let n_coarse = sel.coarse_channels(config.coarse_channel_bw_mhz);

        if let Err(e) = sel.blank_dc(n_coarse) {
            warn!("DC bins kept: {e}");
        }
    }

    let spectrum = if options.average {
        sel.mean_spectrum(0)
    } else {
        sel.spectrum(0, 0)?
    };

    for (f, v) in sel.freqs.iter().zip(&spectrum) {
        writeln!(out, "{f:.6} {v}")?;
    }

    Ok(())
}
