/// Errors raised while building or running a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A filter names a field the model does not declare.
    #[error("Model {model} does not have field {field}")]
    UnknownField { model: String, field: String },

    /// A filter names an operator that does not exist.
    #[error("Filter {0} does not exist")]
    UnknownFilter(String),

    /// A scanned member is not a valid id.
    #[error("invalid id in {key}: {source}")]
    InvalidId {
        key: String,
        #[source]
        source: tessera_types::TypeError,
    },

    /// Materializing an instance failed.
    #[error("failed to load instance: {0}")]
    Load(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] tessera_store::StoreError),
}

impl QueryError {
    /// Wrap a loader failure.
    pub fn load(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Load(Box::new(error))
    }
}

/// Convenience alias for query results.
pub type QueryResult<T> = Result<T, QueryError>;
