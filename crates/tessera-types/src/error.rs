use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid model id: {0:?}")]
    InvalidId(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("value of kind {actual} cannot be used as {expected}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}
