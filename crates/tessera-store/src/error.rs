use crate::keyspace::EntryKind;

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key holds a different data structure than the command expects.
    #[error("wrong type for key {key}: expected {expected}, found {actual}")]
    WrongType {
        key: String,
        expected: EntryKind,
        actual: EntryKind,
    },

    /// No script with this name has been registered.
    #[error("unknown script: {0}")]
    UnknownScript(String),

    /// A script failed while running.
    #[error("script {name} failed: {message}")]
    Script { name: String, message: String },

    /// A sorted-set score is not a finite number.
    #[error("invalid score for {member} in {key}")]
    InvalidScore { key: String, member: String },

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// Failure reported by a remote backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a script error with a name and message.
    pub fn script(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
