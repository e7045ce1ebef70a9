//! Storage encoding and presentation of field values.

use chrono::DateTime;
use serde_json::{Map, Value as Json};
use tessera_types::{Location, Value};

use crate::descriptor::FieldDescriptor;
use crate::error::{CodecError, CodecResult};
use crate::kind::FieldKind;
use crate::secret::{hash_secret, is_hashed};

/// Input and presentation format of datetime fields.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Marker some writers store for an absent value.
const NONE_MARKER: &str = "None";

/// Canonical text of a value, as stored and as checked by patterns.
pub fn text_form(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Datetime(dt) => dt.timestamp().to_string(),
        Value::Location(loc) => loc.to_string(),
        Value::Dict(map) => Json::Object(map.clone()).to_string(),
    }
}

impl FieldDescriptor {
    /// Fail unless `value` is of this field's kind.
    pub fn check_kind(&self, value: &Value) -> CodecResult<()> {
        if self.kind().accepts(value) {
            Ok(())
        } else {
            Err(CodecError::KindMismatch {
                field: self.name().to_string(),
                actual: value.kind_name(),
            })
        }
    }

    /// Encode a value for the store.
    ///
    /// Plaintext handed to a secret field is hashed here.
    pub fn serialize(&self, value: &Value) -> CodecResult<String> {
        self.check_kind(value)?;
        match value {
            Value::Text(text) if self.kind() == FieldKind::Secret && !is_hashed(text) => {
                Ok(hash_secret(text))
            }
            value => Ok(text_form(value)),
        }
    }

    /// Decode a stored value. Absent or `"None"` decodes to no value.
    pub fn deserialize(&self, stored: Option<&str>) -> CodecResult<Option<Value>> {
        let Some(stored) = stored.filter(|s| *s != NONE_MARKER) else {
            return Ok(None);
        };
        let corrupt = || CodecError::Corrupt {
            field: self.name().to_string(),
            stored: stored.to_string(),
        };
        let value = match self.kind() {
            FieldKind::Text | FieldKind::Secret | FieldKind::TreeIndex => {
                Value::Text(stored.to_string())
            }
            FieldKind::Bool => Value::Bool(matches!(stored, "true" | "True" | "1")),
            FieldKind::Integer | FieldKind::Float | FieldKind::Datetime if stored.is_empty() => {
                return Ok(None)
            }
            FieldKind::Integer => Value::Integer(stored.parse().map_err(|_| corrupt())?),
            FieldKind::Float => Value::Float(stored.parse().map_err(|_| corrupt())?),
            FieldKind::Datetime => {
                let secs: i64 = stored.parse().map_err(|_| corrupt())?;
                Value::Datetime(DateTime::from_timestamp(secs, 0).ok_or_else(corrupt)?)
            }
            FieldKind::Location => Value::Location(Location::parse(stored).map_err(|_| corrupt())?),
            FieldKind::Dict => {
                let map = serde_json::from_str::<Map<String, Json>>(stored).map_err(|_| corrupt())?;
                Value::Dict(map)
            }
        };
        Ok(Some(value))
    }

    /// JSON presentation of a value.
    ///
    /// Datetimes render in ISO form, locations as `{"lat", "lon"}` and an
    /// absent dict as `{}`.
    pub fn to_presentation(&self, value: Option<&Value>) -> Json {
        match value {
            None if self.kind() == FieldKind::Dict => Json::Object(Map::new()),
            None => Json::Null,
            Some(Value::Text(s)) => Json::String(s.clone()),
            Some(Value::Bool(b)) => Json::Bool(*b),
            Some(Value::Integer(n)) if self.kind() == FieldKind::Float => Json::from(*n as f64),
            Some(Value::Integer(n)) => Json::from(*n),
            Some(Value::Float(f)) => Json::from(*f),
            Some(Value::Datetime(dt)) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
            Some(Value::Location(loc)) => loc.to_json(),
            Some(Value::Dict(map)) => Json::Object(map.clone()),
        }
    }
}
