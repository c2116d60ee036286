use std::path::Path;

use filbank_types::{Codec, FilbankError, FilbankResult};
use serde::{Deserialize, Serialize};

use crate::{format::MAX_HEADER_BLOCKS, geometry::MAX_BLOB_MB, spectral::COARSE_CHANNEL_BW_MHZ};

/// Лимит выборки, читаемой в память целиком, МиБ
pub const MAX_DATA_ARRAY_MB: usize = 1024;

/// Настройки чтения и конвертации. Любое поле можно опустить в JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilbankConfig {
    /// Бюджет одного блоба, МиБ
    pub blob_mb: usize,
    /// Предел заголовка в 512-байтных блоках
    pub max_header_blocks: usize,
    /// Предел выборки для `read_selection`, МиБ
    pub max_data_array_mb: usize,
    /// Ширина грубого канала, МГц
    pub coarse_channel_bw_mhz: f64,
    /// Преобразование чанков контейнера
    pub codec: Codec,
    /// Убирать DC-бины при конвертации (меняет данные)
    pub blank_dc: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl FilbankConfig {
    /// Загружает конфигурацию из JSON файла.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> FilbankResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            FilbankError::config(format!("{}: {e}", path.as_ref().display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FilbankResult<()> {
        if self.blob_mb == 0 {
            return Err(FilbankError::config("blob_mb must be > 0"));
        }
        if self.max_header_blocks == 0 {
            return Err(FilbankError::config("max_header_blocks must be > 0"));
        }
        if self.coarse_channel_bw_mhz.is_nan() || self.coarse_channel_bw_mhz <= 0.0 {
            return Err(FilbankError::config(format!(
                "coarse_channel_bw_mhz must be > 0, got {}",
                self.coarse_channel_bw_mhz
            )));
        }

        Ok(())
    }

    /// Лимит `read_selection` в байтах.
    pub fn max_data_array_bytes(&self) -> u64 {
        self.max_data_array_mb as u64 * (1 << 20)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for FilbankConfig {
    fn default() -> Self {
        Self {
            blob_mb: MAX_BLOB_MB,
            max_header_blocks: MAX_HEADER_BLOCKS,
            max_data_array_mb: MAX_DATA_ARRAY_MB,
            coarse_channel_bw_mhz: COARSE_CHANNEL_BW_MHZ,
            codec: Codec::ShuffleLz4,
            blank_dc: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let c = FilbankConfig::default();

        assert_eq!(c.blob_mb, 256);
        assert_eq!(c.max_header_blocks, 100);
        assert_eq!(c.max_data_array_bytes(), 1024 * 1024 * 1024);
        assert_eq!(c.codec, Codec::ShuffleLz4);
        assert!(!c.blank_dc);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "blob_mb": 64, "codec": "lz4" }}"#).unwrap();

        let c = FilbankConfig::from_json_file(f.path()).unwrap();

        assert_eq!(c.blob_mb, 64);
        assert_eq!(c.codec, Codec::Lz4);
        assert_eq!(c.max_header_blocks, 100);
    }

    #[test]
    fn test_invalid_json_values() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "blob_mb": 0 }}"#).unwrap();
        assert!(matches!(
            FilbankConfig::from_json_file(f.path()),
            Err(FilbankError::Config(_))
        ));

        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "codec": "zstd" }}"#).unwrap();
        assert!(matches!(
            FilbankConfig::from_json_file(f.path()),
            Err(FilbankError::Config(_))
        ));
    }
}
