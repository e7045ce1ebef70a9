use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

use crate::error::TypeError;
use crate::location::Location;

/// A typed field value.
///
/// Absence of a value is modelled as `Option<Value>::None` by the holders of
/// values, never as a variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    Datetime(DateTime<Utc>),
    Location(Location),
    Dict(Map<String, Json>),
}

impl Value {
    /// Human-readable name of the variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Datetime(_) => "datetime",
            Self::Location(_) => "location",
            Self::Dict(_) => "dict",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Datetime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&Location> {
        match self {
            Self::Location(loc) => Some(loc),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Map<String, Json>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Numeric rank of this value, used to score sorted-set membership.
    ///
    /// Integers and floats rank by value, datetimes by unix seconds and
    /// booleans as 0/1. Other kinds have no rank.
    pub fn rank(&self) -> Result<f64, TypeError> {
        match self {
            Self::Integer(i) => Ok(*i as f64),
            Self::Float(f) => Ok(*f),
            Self::Datetime(dt) => Ok(dt.timestamp() as f64),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(TypeError::KindMismatch {
                expected: "rankable value",
                actual: other.kind_name(),
            }),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.partial_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Datetime(a), Self::Datetime(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Datetime(dt)
    }
}

impl From<Location> for Value {
    fn from(loc: Location) -> Self {
        Self::Location(loc)
    }
}

impl From<Map<String, Json>> for Value {
    fn from(map: Map<String, Json>) -> Self {
        Self::Dict(map)
    }
}
