use std::fmt;

use serde_json::{json, Value as Json};

/// Why a field value was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldErrorKind {
    /// A required value is absent, null or empty.
    Missing,
    /// The value cannot be parsed or fails a pattern or allowed-list check.
    Invalid,
    /// The value is on the field's forbidden list.
    Reserved,
    /// Another instance already holds this value in a unique index.
    NotUnique,
}

impl FieldErrorKind {
    /// Short code used in i18n keys.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => "required",
            Self::Invalid => "invalid",
            Self::Reserved => "reserved",
            Self::NotUnique => "unique",
        }
    }
}

/// A rejected field value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.detail())]
pub struct BadField {
    pub kind: FieldErrorKind,
    pub field: String,
}

impl BadField {
    pub fn new(kind: FieldErrorKind, field: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Missing, field)
    }

    pub fn invalid(field: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Invalid, field)
    }

    pub fn reserved(field: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Reserved, field)
    }

    pub fn not_unique(field: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::NotUnique, field)
    }

    /// Human-readable message, e.g. `name is required`.
    pub fn detail(&self) -> String {
        let field = &self.field;
        match self.kind {
            FieldErrorKind::Missing => format!("{field} is required"),
            FieldErrorKind::Invalid => format!("{field} is not valid"),
            FieldErrorKind::Reserved => format!("{field} is reserved"),
            FieldErrorKind::NotUnique => format!("{field} is not unique"),
        }
    }

    /// Translation key, `errors.<field>.<code>`.
    pub fn i18n(&self) -> String {
        format!("errors.{}.{}", self.field, self.kind.code())
    }

    pub fn to_json(&self) -> Json {
        json!({
            "detail": self.detail(),
            "field": self.field,
            "i18n": self.i18n(),
        })
    }
}

/// Every field error of one operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<BadField>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: BadField) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BadField> {
        self.errors.iter()
    }

    /// Whether some error concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn to_json(&self) -> Json {
        Json::Array(self.errors.iter().map(BadField::to_json).collect())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let details: Vec<String> = self.errors.iter().map(BadField::detail).collect();
        write!(f, "validation failed: {}", details.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<BadField> for ValidationErrors {
    fn from(error: BadField) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl IntoIterator for ValidationErrors {
    type Item = BadField;
    type IntoIter = std::vec::IntoIter<BadField>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Errors from encoding or decoding field values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A single field value was rejected.
    #[error(transparent)]
    Field(#[from] BadField),

    /// A stored value does not decode as the field's kind.
    #[error("corrupt stored value for {field}: {stored:?}")]
    Corrupt { field: String, stored: String },

    /// A value of the wrong kind was handed to a field.
    #[error("field {field} cannot hold a {actual} value")]
    KindMismatch { field: String, actual: &'static str },
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
