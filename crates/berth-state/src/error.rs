//! Error types for the Berth state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by [`StateStore`](crate::StateStore). Backend failures carry
/// the redb or serde message as text.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("stale index {index} for table {table}: current index is {current}")]
    StaleIndex {
        table: &'static str,
        index: u64,
        current: u64,
    },
}
