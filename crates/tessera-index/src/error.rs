//! Error types for the index crate.

use tessera_codec::BadField;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Another instance already holds the value.
    #[error(transparent)]
    NotUnique(BadField),

    /// An index entry points at a malformed id.
    #[error("index {key} holds an invalid id: {source}")]
    InvalidId {
        key: String,
        #[source]
        source: tessera_types::TypeError,
    },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] tessera_store::StoreError),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
