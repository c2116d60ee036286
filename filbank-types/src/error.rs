use thiserror::Error;

/// Результат для операций filbank
pub type FilbankResult<T> = std::result::Result<T, FilbankError>;

/// Ось, к которой относится ошибка выборки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Time,
    Beam,
    Frequency,
}

/// Типы ошибок чтения, выборки и конвертации filterbank данных.
#[derive(Debug, Error)]
pub enum FilbankError {
    /// Заголовок не разбирается или не заканчивается в допустимых пределах
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Запрошенное окно целиком лежит вне оси
    #[error("Selection out of range on {axis} axis: requested [{start}, {stop}), axis length {len}")]
    OutOfRange {
        axis: Axis,
        start: i64,
        stop: i64,
        len: usize,
    },

    /// Запрошенное окно пустое
    #[error("Empty selection on {axis} axis at index {at}")]
    EmptySelection { axis: Axis, at: i64 },

    /// Форма источника не совпадает с объявленной формой приёмника
    #[error("Incompatible shape: source {source_shape}, destination {destination_shape}")]
    IncompatibleShape {
        source_shape: String,
        destination_shape: String,
    },

    /// Запрошенный кодек не собран в этой сборке
    #[error("Codec unavailable: {0}")]
    CodecUnavailable(String),

    /// Повреждённые данные контейнера (CRC, метаданные, размер чанка)
    #[error("Corrupted data: {0}")]
    Corrupted(String),

    /// Число грубых каналов не делит частотную ось
    #[error("Invalid coarse channel count: {0}")]
    InvalidCoarseChannels(String),

    /// Выборка не помещается в лимит памяти для чтения целиком
    #[error("Selection too large: {bytes} bytes exceeds in-memory limit of {limit} bytes")]
    SelectionTooLarge { bytes: u64, limit: u64 },

    /// Некорректная конфигурация
    #[error("Config error: {0}")]
    Config(String),

    /// Ошибки ввода/вывода (автоконвертируются из std::io::Error)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FilbankError {
    /// Удобные конструкторы
    pub fn malformed<S: Into<String>>(s: S) -> Self {
        Self::MalformedHeader(s.into())
    }

    pub fn corrupted<S: Into<String>>(s: S) -> Self {
        Self::Corrupted(s.into())
    }

    pub fn config<S: Into<String>>(s: S) -> Self {
        Self::Config(s.into())
    }

    pub fn incompatible(
        source_shape: impl std::fmt::Debug,
        destination_shape: impl std::fmt::Debug,
    ) -> Self {
        Self::IncompatibleShape {
            source_shape: format!("{source_shape:?}"),
            destination_shape: format!("{destination_shape:?}"),
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Axis::Time => write!(f, "time"),
            Axis::Beam => write!(f, "beam"),
            Axis::Frequency => write!(f, "frequency"),
        }
    }
}
