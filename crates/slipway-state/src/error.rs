//! Error types for the Slipway state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
///
/// `Validation`, `NotFound`, `Transaction`, and `Invariant` form the caller
/// taxonomy; the remaining variants wrap backend failures. The store never
/// retries — every failure is a synchronous return value, and a failed write
/// transaction leaves no partial state behind.
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

    #[error("invalid record: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A condition that should be unreachable, e.g. an index entry pointing
    /// at a record that does not exist. Programmer error, not retryable.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl StateError {
    /// True when the error is the not-found taxon (as opposed to a backend
    /// failure that merely prevented the lookup).
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }
}

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}

pub(crate) use map_err;
