use thiserror::Error;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl LedgerError {
    pub fn storage(context: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        Self::StorageError(format!("{} {}: {}", context, path.display(), err))
    }

    pub fn corrupt_line(line: usize, msg: impl std::fmt::Display) -> Self {
        Self::CorruptRecord(format!("line {}: {}", line, msg))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
