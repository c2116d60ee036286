use thiserror::Error;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Ошибка чтения/конвертации filterbank
    #[error("{0}")]
    Filbank(#[from] filbank_types::FilbankError),

    /// Ошибка вывода
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Некорректный аргумент командной строки
    #[error("Invalid argument {arg}: {reason}")]
    InvalidArgument { arg: &'static str, reason: String },

    /// Вход уже в запрошенном формате
    #[error("{path} is already a {kind}")]
    AlreadyConverted { path: String, kind: String },
}
