use std::{
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::{Args, Parser, Subcommand};
use filbank_cli::{
    parse_codec, parse_opt_freq, run_convert, run_info, run_spectrum, CliResult,
    ConfigOverrides, ConvertRequest, InputKind, SpectrumOptions,
};
use filbank_core::{FilbankConfig, SelectionRequest};
use log::{error, info, warn, LevelFilter};

#[derive(Parser, Debug)]
#[command(
    name = "filbank",
    version = env!("CARGO_PKG_VERSION"),
    about = "Out-of-core access and conversion of filterbank data",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// JSON файл конфигурации (blob_mb, codec, coarse_channel_bw_mhz, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Тихий режим (только ошибки)
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Подробный вывод (по блобам)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Заголовок и производные величины
    Info {
        file: PathBuf,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Плоский файл -> контейнер или обратно
    Convert {
        file: PathBuf,
        /// Писать чанковый контейнер
        #[arg(short = 'H', long, conflicts_with = "to_flat")]
        to_container: bool,
        /// Писать плоский файл
        #[arg(short = 'F', long)]
        to_flat: bool,
        /// Путь результата. По умолчанию: расширение меняется на .fbc/.fil
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Бюджет памяти на блоб, МБ
        #[arg(long)]
        blob_mb: Option<usize>,
        /// Преобразование чанков: none, lz4, shuffle-lz4
        #[arg(long)]
        codec: Option<String>,
        /// Убирать DC-бины во время конвертации
        #[arg(long)]
        blank_dc: bool,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Спектр выборки: строки "freq value"
    Spectrum {
        file: PathBuf,
        /// Не убирать DC-бины
        #[arg(short = 'D', long)]
        keep_dc: bool,
        /// Усреднить по времени
        #[arg(short, long)]
        average: bool,
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

/// Окно выборки.
#[derive(Args, Debug)]
struct SelectionArgs {
    /// Начальная частота (1420MHz, 1.42GHz, 1420)
    #[arg(short = 'b', long)]
    f_start: Option<String>,
    /// Конечная частота
    #[arg(short = 'e', long)]
    f_stop: Option<String>,
    /// Первая интеграция
    #[arg(short = 'B', long)]
    t_start: Option<u64>,
    /// Интеграция после последней
    #[arg(short = 'E', long)]
    t_stop: Option<u64>,
}

impl SelectionArgs {
    fn request(&self) -> CliResult<SelectionRequest> {
        Ok(SelectionRequest::full()
            .with_freq(
                parse_opt_freq("--f-start", self.f_start.as_deref())?,
                parse_opt_freq("--f-stop", self.f_stop.as_deref())?,
            )
            .with_time(self.t_start, self.t_stop))
    }
}

fn load_config(
    path: Option<&PathBuf>,
    overrides: &ConfigOverrides,
) -> CliResult<FilbankConfig> {
    let base = match path {
        Some(p) => FilbankConfig::from_json_file(p)?,
        None => FilbankConfig::default(),
    };

    overrides.apply(base)
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        LevelFilter::Error
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_target(false)
        .format_timestamp_secs()
        .init();

    if let Err(e) = run(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let stdout = std::io::stdout();

    match cli.command {
        Command::Info { file, selection } => {
            let config = load_config(cli.config.as_ref(), &ConfigOverrides::default())?;
            run_info(&file, &selection.request()?, &config, &mut stdout.lock())?;
        }
        Command::Spectrum {
            file,
            keep_dc,
            average,
            selection,
        } => {
            let config = load_config(cli.config.as_ref(), &ConfigOverrides::default())?;
            let options = SpectrumOptions { average, keep_dc };
            let mut out = stdout.lock();

            run_spectrum(&file, &selection.request()?, &config, options, &mut out)?;
            out.flush()?;
        }
        Command::Convert {
            file,
            to_container,
            to_flat,
            output,
            blob_mb,
            codec,
            blank_dc,
            selection,
        } => {
            let overrides = ConfigOverrides {
                blob_mb,
                codec: codec.as_deref().map(parse_codec).transpose()?,
                blank_dc,
            };
            let config = load_config(cli.config.as_ref(), &overrides)?;

            let target = match (to_container, to_flat) {
                (true, _) => Some(InputKind::Container),
                (_, true) => Some(InputKind::Flat),
                _ => None,
            };
            let request = ConvertRequest {
                input: file,
                output,
                target,
                selection: selection.request()?,
            };

            let stop_flag = Arc::new(AtomicBool::new(false));
            let stop_ctrlc = stop_flag.clone();

            if let Err(e) = ctrlc::set_handler(move || {
                if stop_ctrlc.swap(true, Ordering::SeqCst) {
                    // Второй Ctrl+C: принудительный выход
                    warn!("Force exit");
                    std::process::exit(130);
                }
                warn!("Ctrl+C received, finishing current blob and finalizing output...");
            }) {
                warn!("Failed to set Ctrl+C handler: {e}");
            }

            info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            info!("  Input         : {:?}", request.input);
            info!("  Blob budget   : {} MB", config.blob_mb);
            info!("  Codec         : {}", config.codec);
            info!("  Blank DC      : {}", config.blank_dc);
            info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

            let report = run_convert(&request, &config, stop_flag)?;

            info!(
                "  Chunk {} | blob {} | {} blobs",
                report.plan.chunk, report.plan.blob, report.plan.count
            );
            info!("\n{}", report.metrics);

            if report.interrupted {
                warn!(
                    "⚠ Stopped after {}/{} blobs",
                    report.blobs, report.plan.count
                );
                std::process::exit(130);
            }

            info!("✓ Conversion complete ({:?})", report.mode);
        }
    }

    Ok(())
}
