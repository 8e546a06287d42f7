//! Registry error types.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Failures of the registry store. Every variant except `InvalidAccount`
/// means the database itself is unusable or corrupt.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open registry database: {0}")]
    Open(String),

    #[error("registry transaction failed: {0}")]
    Transaction(String),

    #[error("cannot open registry table: {0}")]
    Table(String),

    #[error("registry read failed: {0}")]
    Read(String),

    #[error("registry write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("stored record is corrupt: {0}")]
    Deserialize(String),

    #[error("invalid account '{0}', expected user@domain")]
    InvalidAccount(String),
}
