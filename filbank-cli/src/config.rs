use std::path::{Path, PathBuf};

use filbank_core::{ConversionMode, FilbankConfig};
use filbank_types::Codec;

use crate::{CliError, CliResult};

/// Расширение каталога контейнера
pub const CONTAINER_EXT: &str = "fbc";

/// Вид входных данных.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Плоский sigproc файл
    Flat,
    /// Чанковый контейнер (каталог)
    Container,
}

/// Переопределения конфигурации из командной строки.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub blob_mb: Option<usize>,
    pub codec: Option<Codec>,
    pub blank_dc: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl InputKind {
    /// Определяет вид по пути: каталог или `.fbc` - контейнер.
    pub fn detect(path: &Path) -> Self {
        let is_fbc = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(CONTAINER_EXT));

        if path.is_dir() || is_fbc {
            InputKind::Container
        } else {
            InputKind::Flat
        }
    }

    /// Направление конвертации из этого вида во второй.
    pub fn conversion_mode(&self) -> ConversionMode {
        match self {
            InputKind::Flat => ConversionMode::FlatToChunked,
            InputKind::Container => ConversionMode::ChunkedToFlat,
        }
    }
}

impl ConfigOverrides {
    /// Накладывает флаги на конфигурацию и проверяет результат.
    pub fn apply(
        &self,
        mut config: FilbankConfig,
    ) -> CliResult<FilbankConfig> {
        if let Some(mb) = self.blob_mb {
            config.blob_mb = mb;
        }
        if let Some(codec) = self.codec {
            config.codec = codec;
        }
        config.blank_dc |= self.blank_dc;

        config.validate()?;
        Ok(config)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for InputKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            InputKind::Flat => write!(f, "flat filterbank file"),
            InputKind::Container => write!(f, "chunked container"),
        }
    }
}

/// Путь результата по умолчанию: расширение меняется на `.fbc` или `.fil`.
pub fn default_output(
    input: &Path,
    mode: ConversionMode,
) -> PathBuf {
    match mode {
        ConversionMode::FlatToChunked => input.with_extension(CONTAINER_EXT),
        ConversionMode::ChunkedToFlat => input.with_extension("fil"),
    }
}

/// Парсит частоту в МГц.
///
/// Поддерживает суффиксы: `GHz`, `MHz`, `kHz`, `Hz` (регистронезависимо);
/// без суффикса число считается в МГц.
///
/// # Примеры
/// ```
/// use filbank_cli::config::parse_freq_mhz;
/// assert_eq!(parse_freq_mhz("8420.5").unwrap(), 8420.5);
/// assert_eq!(parse_freq_mhz("1.5GHz").unwrap(), 1500.0);
/// assert_eq!(parse_freq_mhz("500kHz").unwrap(), 0.5);
/// ```
pub fn parse_freq_mhz(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let lower = s.to_lowercase();

    // (число, множитель, делитель) относительно МГц
    let (num_str, mul, div) = if let Some(v) = lower.strip_suffix("ghz") {
        (v.trim(), 1_000_f64, 1_f64)
    } else if let Some(v) = lower.strip_suffix("mhz") {
        (v.trim(), 1_f64, 1_f64)
    } else if let Some(v) = lower.strip_suffix("khz") {
        (v.trim(), 1_f64, 1_000_f64)
    } else if let Some(v) = lower.strip_suffix("hz") {
        (v.trim(), 1_f64, 1_000_000_f64)
    } else {
        (lower.as_str(), 1_f64, 1_f64)
    };

    let n: f64 = num_str
        .parse()
        .map_err(|e| format!("Invalid frequency value '{num_str}': {e}"))?;

    if !n.is_finite() {
        return Err(format!("Invalid frequency '{s}'"));
    }

    Ok(n * mul / div)
}

/// Парсит преобразование чанков: `none`, `lz4`, `shuffle-lz4`.
pub fn parse_codec(s: &str) -> CliResult<Codec> {
    s.parse().map_err(|reason| CliError::InvalidArgument {
        arg: "--codec",
        reason,
    })
}

/// Необязательная частота из аргумента.
pub fn parse_opt_freq(
    arg: &'static str,
    value: Option<&str>,
) -> CliResult<Option<f64>> {
    value
        .map(|v| parse_freq_mhz(v).map_err(|reason| CliError::InvalidArgument { arg, reason }))
        .transpose()
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_freq_mhz() {
        assert_eq!(parse_freq_mhz("1420").unwrap(), 1420.0);
        assert_eq!(parse_freq_mhz("1420MHz").unwrap(), 1420.0);
        assert_eq!(parse_freq_mhz(" 8.25 GHz ").unwrap(), 8250.0);
        assert_eq!(parse_freq_mhz("2500kHz").unwrap(), 2.5);
        assert_eq!(parse_freq_mhz("1000000Hz").unwrap(), 1.0);
        assert!(parse_freq_mhz("abc").is_err());
        assert!(parse_freq_mhz("infMHz").is_err());
    }

    #[test]
    fn test_parse_codec() {
        assert_eq!(parse_codec("none").unwrap(), Codec::None);
        assert_eq!(parse_codec("LZ4").unwrap(), Codec::Lz4);
        assert_eq!(parse_codec("shuffle-lz4").unwrap(), Codec::ShuffleLz4);
        assert!(matches!(
            parse_codec("zstd"),
            Err(CliError::InvalidArgument { arg: "--codec", .. })
        ));
    }

    #[test]
    fn test_detect_input_kind() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(InputKind::detect(dir.path()), InputKind::Container);
        assert_eq!(InputKind::detect(Path::new("obs.fbc")), InputKind::Container);
        assert_eq!(InputKind::detect(Path::new("obs.fil")), InputKind::Flat);
        assert_eq!(
            InputKind::Flat.conversion_mode(),
            ConversionMode::FlatToChunked
        );
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/d/obs.fil"), ConversionMode::FlatToChunked),
            PathBuf::from("/d/obs.fbc")
        );
        assert_eq!(
            default_output(Path::new("obs.fbc"), ConversionMode::ChunkedToFlat),
            PathBuf::from("obs.fil")
        );
    }

    #[test]
    fn test_overrides_apply() {
        let o = ConfigOverrides {
            blob_mb: Some(32),
            codec: Some(Codec::None),
            blank_dc: true,
        };
        let c = o.apply(FilbankConfig::default()).unwrap();

        assert_eq!(c.blob_mb, 32);
        assert_eq!(c.codec, Codec::None);
        assert!(c.blank_dc);

        let bad = ConfigOverrides {
            blob_mb: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            bad.apply(FilbankConfig::default()),
            Err(CliError::Filbank(_))
        ));
    }
}
