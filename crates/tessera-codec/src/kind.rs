use std::fmt;

use tessera_types::Value;

/// Semantic type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    /// Text stored one-way hashed.
    Secret,
    Bool,
    Integer,
    Float,
    Datetime,
    /// A geo point kept in the namespace's geo index.
    Location,
    /// A JSON object kept under its own key.
    Dict,
    /// Colon-delimited hierarchical path, indexed for ancestor lookups.
    TreeIndex,
}

/// Where a field's value lives in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    /// A field of the instance's `obj` hash.
    Record,
    /// A member of the namespace geo index `ns:geo_<field>`.
    Geo,
    /// Its own hash `ns:<id>:dict_<field>`.
    DictKey,
}

impl FieldKind {
    pub fn storage(&self) -> Storage {
        match self {
            Self::Location => Storage::Geo,
            Self::Dict => Storage::DictKey,
            _ => Storage::Record,
        }
    }

    /// Whether `value` is the variant this kind holds.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Text | Self::Secret | Self::TreeIndex, Value::Text(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::Integer, Value::Integer(_))
                | (Self::Float, Value::Float(_) | Value::Integer(_))
                | (Self::Datetime, Value::Datetime(_))
                | (Self::Location, Value::Location(_))
                | (Self::Dict, Value::Dict(_))
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Secret => "secret",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Datetime => "datetime",
            Self::Location => "location",
            Self::Dict => "dict",
            Self::TreeIndex => "tree_index",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_by_kind() {
        assert_eq!(FieldKind::Text.storage(), Storage::Record);
        assert_eq!(FieldKind::Location.storage(), Storage::Geo);
        assert_eq!(FieldKind::Dict.storage(), Storage::DictKey);
    }

    #[test]
    fn accepts_matching_variants() {
        assert!(FieldKind::Secret.accepts(&Value::from("x")));
        assert!(FieldKind::Float.accepts(&Value::Integer(2)));
        assert!(!FieldKind::Integer.accepts(&Value::Float(2.0)));
        assert!(!FieldKind::Bool.accepts(&Value::from("true")));
    }
}
