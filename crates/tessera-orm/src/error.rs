use tessera_codec::ValidationErrors;

/// Errors from model operations.
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// One or more fields were rejected.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The model is not registered with the engine.
    #[error("model {0} is not bound to the engine")]
    UnboundModel(String),

    /// The schema registry is inconsistent.
    #[error("improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// The instance does not exist in the store.
    #[error("{model} {id} does not exist")]
    ModelNotFound { model: String, id: String },

    /// A restricted relation still has dependents.
    #[error("cannot delete {model} {id}: relation {relation} is restricted")]
    DeleteRestricted {
        model: String,
        id: String,
        relation: String,
    },

    /// The model declares no such field.
    #[error("model {model} has no field {field}")]
    UnknownField { model: String, field: String },

    /// The model declares no such relation, or not of the requested kind.
    #[error("model {model} has no {kind} relation {relation}")]
    UnknownRelation {
        model: String,
        relation: String,
        kind: &'static str,
    },

    /// An instance of the wrong model was handed to a relation.
    #[error("relation {relation} relates {expected}, not {actual}")]
    WrongTarget {
        relation: String,
        expected: String,
        actual: String,
    },

    /// A sorted relation member has no rankable sort value.
    #[error("cannot rank {model} {id} by {field}")]
    SortValue {
        model: String,
        id: String,
        field: String,
    },

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(#[from] tessera_codec::CodecError),

    #[error("index error: {0}")]
    Index(#[from] tessera_index::IndexError),

    #[error("query error: {0}")]
    Query(#[from] tessera_query::QueryError),

    #[error("permission error: {0}")]
    Auth(#[from] tessera_auth::AuthError),

    #[error("store error: {0}")]
    Store(#[from] tessera_store::StoreError),

    #[error("type error: {0}")]
    Type(#[from] tessera_types::TypeError),
}

impl OrmError {
    pub(crate) fn not_found(model: &str, id: impl ToString) -> Self {
        Self::ModelNotFound {
            model: model.to_string(),
            id: id.to_string(),
        }
    }
}

/// Convenience alias for model operation results.
pub type OrmResult<T> = Result<T, OrmError>;
