use serde::{Deserialize, Serialize};

/// Преобразование байтов чанка контейнера.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Codec {
    /// Без сжатия
    None = 0,
    /// Сжатие LZ4
    Lz4 = 1,
    /// Перестановка байтов по разрядам (shuffle), затем LZ4
    #[default]
    ShuffleLz4 = 2,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Lz4 => "lz4",
            Codec::ShuffleLz4 => "shuffle-lz4",
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Codec::None)
    }
}

impl std::fmt::Display for Codec {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "no" | "off" => Ok(Codec::None),
            "lz4" => Ok(Codec::Lz4),
            "shuffle-lz4" | "shuffle" | "bitshuffle" => Ok(Codec::ShuffleLz4),
            _ => Err(format!(
                "Unknown codec '{s}'. Use: none, lz4, shuffle-lz4"
            )),
        }
    }
}
