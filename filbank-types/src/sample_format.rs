use crate::{FilbankError, FilbankResult};

/// Формат одной выборки мощности (определяется `nbits`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleFormat {
    /// 8-битные беззнаковые целые
    UInt8 = 8,
    /// 16-битные беззнаковые целые
    UInt16 = 16,
    /// 32-битные числа с плавающей точкой
    Float32 = 32,
}

impl SampleFormat {
    pub fn from_nbits(nbits: u32) -> FilbankResult<Self> {
        match nbits {
            8 => Ok(SampleFormat::UInt8),
            16 => Ok(SampleFormat::UInt16),
            32 => Ok(SampleFormat::Float32),
            _ => Err(FilbankError::malformed(format!(
                "nbits must be one of 8, 16, 32, got {nbits}"
            ))),
        }
    }

    pub fn nbits(&self) -> u32 {
        *self as u32
    }

    /// Размер одной выборки в байтах
    pub fn sample_size(&self) -> usize {
        match self {
            SampleFormat::UInt8 => 1,
            SampleFormat::UInt16 => 2,
            SampleFormat::Float32 => 4,
        }
    }

    /// Имя типа в метаданных контейнера (numpy-подобное, little-endian).
    pub fn dtype(&self) -> &'static str {
        match self {
            SampleFormat::UInt8 => "<u1",
            SampleFormat::UInt16 => "<u2",
            SampleFormat::Float32 => "<f4",
        }
    }

    pub fn from_dtype(s: &str) -> FilbankResult<Self> {
        match s {
            "<u1" | "|u1" | "u1" => Ok(SampleFormat::UInt8),
            "<u2" | "u2" => Ok(SampleFormat::UInt16),
            "<f4" | "f4" => Ok(SampleFormat::Float32),
            _ => Err(FilbankError::corrupted(format!("unsupported dtype '{s}'"))),
        }
    }

    /// Декодирует little-endian байты в f32. Хвост, не кратный размеру
    /// выборки, игнорируется.
    pub fn decode(
        &self,
        bytes: &[u8],
    ) -> Vec<f32> {
        match self {
            SampleFormat::UInt8 => bytes.iter().map(|&b| b as f32).collect(),
            SampleFormat::UInt16 => bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as f32)
                .collect(),
            SampleFormat::Float32 => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }

    /// Кодирует значения в little-endian байты. Целые форматы округляются и
    /// насыщаются до диапазона типа.
    pub fn encode(
        &self,
        values: &[f32],
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(values.len() * self.sample_size());

        match self {
            SampleFormat::UInt8 => {
                out.extend(values.iter().map(|v| v.round().clamp(0.0, u8::MAX as f32) as u8));
            }
            SampleFormat::UInt16 => {
                for v in values {
                    let s = v.round().clamp(0.0, u16::MAX as f32) as u16;
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }
            SampleFormat::Float32 => {
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }

        out
    }
}
