/// Errors from permission operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A grant string is not `path[/restriction]` with non-empty parts.
    #[error("invalid permission spec: {0:?}")]
    InvalidSpec(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] tessera_store::StoreError),
}

/// Convenience alias for permission results.
pub type AuthResult<T> = Result<T, AuthError>;
