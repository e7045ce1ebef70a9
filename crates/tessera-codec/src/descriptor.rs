use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::{Map, Value as Json};
use tessera_types::{Location, Value};

use crate::encode::{text_form, DATETIME_FORMAT};
use crate::error::BadField;
use crate::kind::{FieldKind, Storage};
use crate::secret::{hash_secret, is_hashed};

/// Integral floats in `[I64_LOW, I64_HIGH)` convert to `i64` exactly.
const I64_LOW: f64 = i64::MIN as f64;
const I64_HIGH: f64 = -(i64::MIN as f64);

/// Value used when a field is not supplied.
#[derive(Clone)]
pub enum FieldDefault {
    Static(Value),
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    pub fn value(&self) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed"),
        }
    }
}

/// Declaration of one attribute of a model.
///
/// Built with a kind constructor and chained modifiers:
///
/// ```
/// use tessera_codec::FieldDescriptor;
///
/// let email = FieldDescriptor::text("email").unique();
/// let age = FieldDescriptor::integer("age").optional();
/// assert!(email.is_unique());
/// assert!(!age.is_required());
/// ```
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    unique: bool,
    required: bool,
    default: Option<FieldDefault>,
    private: bool,
    fillable: bool,
    pattern: Option<Regex>,
    forbidden: Vec<String>,
    allowed: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            unique: false,
            required: true,
            default: None,
            private: false,
            fillable: true,
            pattern: None,
            forbidden: Vec::new(),
            allowed: Vec::new(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn secret(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Secret)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Datetime)
    }

    pub fn location(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Location)
    }

    pub fn dict(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Dict)
    }

    pub fn tree_index(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::TreeIndex)
    }

    // -- modifiers --

    /// Map values to ids in a unique index.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Static(value.into()));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(FieldDefault::Computed(Arc::new(f)));
        self
    }

    /// Leave the field out of JSON presentations.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Refuse the field in bulk updates.
    pub fn not_fillable(mut self) -> Self {
        self.fillable = false;
        self
    }

    /// Require the text form of the value to start with a match of `pattern`.
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Values rejected as reserved.
    pub fn forbidden<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden = values.into_iter().map(Into::into).collect();
        self
    }

    /// The only values accepted.
    pub fn allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    // -- accessors --

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn storage(&self) -> Storage {
        self.kind.storage()
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Booleans and dicts are never reported missing.
    pub fn is_required(&self) -> bool {
        self.required && !matches!(self.kind, FieldKind::Bool | FieldKind::Dict)
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_fillable(&self) -> bool {
        self.fillable
    }

    pub fn resolve_default(&self) -> Option<Value> {
        self.default.as_ref().map(FieldDefault::value)
    }

    // -- validation --

    /// Validate raw input into a typed value.
    ///
    /// `None`, JSON null and blank strings count as missing. Missing values
    /// take the default, then the required check applies. Pattern, forbidden
    /// and allowed checks run on the text form of whatever value results.
    /// Uniqueness is checked by the index, not here.
    pub fn validate(&self, raw: Option<&Json>) -> Result<Option<Value>, BadField> {
        let value = match present(raw) {
            Some(raw) => Some(self.parse(&raw)?),
            None => self.resolve_default(),
        };

        let Some(value) = value else {
            if self.kind == FieldKind::Dict {
                return Ok(Some(Value::Dict(Map::new())));
            }
            if self.is_required() {
                return Err(BadField::missing(&self.name));
            }
            return Ok(None);
        };

        self.check_lists(&value)?;

        match value {
            Value::Text(text) if self.kind == FieldKind::Secret && !is_hashed(&text) => {
                Ok(Some(Value::Text(hash_secret(&text))))
            }
            value => Ok(Some(value)),
        }
    }

    /// Value an instance takes when constructed with `value`.
    ///
    /// Applies the default and hashes plaintext secrets; performs no checks.
    pub fn init(&self, value: Option<Value>) -> Option<Value> {
        let value = value.or_else(|| self.resolve_default());
        match (self.kind, value) {
            (FieldKind::Secret, Some(Value::Text(text))) if !is_hashed(&text) => {
                Some(Value::Text(hash_secret(&text)))
            }
            (FieldKind::Dict, None) => Some(Value::Dict(Map::new())),
            (_, value) => value,
        }
    }

    fn check_lists(&self, value: &Value) -> Result<(), BadField> {
        if self.pattern.is_none() && self.forbidden.is_empty() && self.allowed.is_empty() {
            return Ok(());
        }
        let text = text_form(value);
        if let Some(pattern) = &self.pattern {
            if !pattern.find(&text).is_some_and(|m| m.start() == 0) {
                return Err(BadField::invalid(&self.name));
            }
        }
        if self.forbidden.iter().any(|f| *f == text) {
            return Err(BadField::reserved(&self.name));
        }
        if !self.allowed.is_empty() && !self.allowed.iter().any(|a| *a == text) {
            return Err(BadField::invalid(&self.name));
        }
        Ok(())
    }

    fn parse(&self, raw: &Json) -> Result<Value, BadField> {
        let invalid = || BadField::invalid(&self.name);
        match self.kind {
            FieldKind::Text | FieldKind::Secret => {
                scalar_text(raw).map(Value::Text).ok_or_else(invalid)
            }
            FieldKind::TreeIndex => scalar_text(raw)
                .filter(|path| path.split(':').all(|segment| !segment.is_empty()))
                .map(Value::Text)
                .ok_or_else(invalid),
            FieldKind::Bool => Ok(Value::Bool(match raw {
                Json::Bool(b) => *b,
                Json::String(s) => s == "true" || s == "1",
                Json::Number(n) => n.as_i64() == Some(1),
                _ => false,
            })),
            FieldKind::Integer => match raw {
                Json::Number(n) => n
                    .as_i64()
                    .or_else(|| {
                        n.as_f64()
                            .filter(|f| f.fract() == 0.0 && (I64_LOW..I64_HIGH).contains(f))
                            .map(|f| f as i64)
                    })
                    .map(Value::Integer)
                    .ok_or_else(invalid),
                Json::String(s) => s.parse().map(Value::Integer).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            FieldKind::Float => match raw {
                Json::Number(n) => n.as_f64().map(Value::Float).ok_or_else(invalid),
                Json::String(s) => s
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Value::Float)
                    .ok_or_else(invalid),
                _ => Err(invalid()),
            },
            FieldKind::Datetime => match raw {
                Json::String(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                    .map(|dt| Value::Datetime(dt.and_utc()))
                    .map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            FieldKind::Location => match raw {
                Json::String(s) => Location::parse(s).map(Value::Location).map_err(|_| invalid()),
                Json::Object(map) => {
                    let coord = |k: &str| map.get(k).and_then(Json::as_f64);
                    match (coord("lon"), coord("lat")) {
                        (Some(lon), Some(lat)) => Location::new(lon, lat)
                            .map(Value::Location)
                            .map_err(|_| invalid()),
                        _ => Err(invalid()),
                    }
                }
                _ => Err(invalid()),
            },
            FieldKind::Dict => match raw {
                Json::Object(map) => Ok(Value::Dict(map.clone())),
                Json::String(s) => serde_json::from_str::<Map<String, Json>>(s)
                    .map(Value::Dict)
                    .map_err(|_| invalid()),
                _ => Err(invalid()),
            },
        }
    }
}

/// Raw input with blank strings trimmed and missing values removed.
fn present(raw: Option<&Json>) -> Option<Json> {
    match raw? {
        Json::Null => None,
        Json::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| Json::String(trimmed.to_string()))
        }
        other => Some(other.clone()),
    }
}

fn scalar_text(raw: &Json) -> Option<String> {
    match raw {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
