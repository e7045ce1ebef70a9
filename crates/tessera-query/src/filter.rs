use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use tessera_types::{Instance, Value};

use crate::error::QueryError;

/// Comparison applied by a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    StartsWith,
    EndsWith,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
        }
    }
}

impl FromStr for FilterOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            other => return Err(QueryError::UnknownFilter(other.to_string())),
        })
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One predicate over a field, e.g. `age__gte` against `18`.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Parse `field` or `field__op`; the op defaults to `eq`.
    pub fn parse(spec: &str, value: Value) -> Result<Self, QueryError> {
        let (field, op) = match spec.split_once("__") {
            Some((field, op)) => (field, op.parse()?),
            None => (spec, FilterOp::Eq),
        };
        Ok(Self {
            field: field.to_string(),
            op,
            value,
        })
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        let id;
        let actual = if self.field == "id" {
            id = Value::Text(instance.id().to_string());
            Some(&id)
        } else {
            instance.get(&self.field)
        };
        // a missing value only satisfies `ne`
        let Some(actual) = actual else {
            return self.op == FilterOp::Ne;
        };
        let expected = &self.value;
        match self.op {
            FilterOp::Eq => equals(actual, expected),
            FilterOp::Ne => !equals(actual, expected),
            FilterOp::Lt => actual.partial_cmp(expected) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                actual.partial_cmp(expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => actual.partial_cmp(expected) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                actual.partial_cmp(expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::StartsWith => {
                text_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(e))
            }
            FilterOp::EndsWith => text_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(e)),
        }
    }
}

fn equals(actual: &Value, expected: &Value) -> bool {
    actual == expected || actual.partial_cmp(expected) == Some(Ordering::Equal)
}

fn text_pair<'a>(actual: &'a Value, expected: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((actual.as_text()?, expected.as_text()?))
}

#[cfg(test)]
mod tests {
    use tessera_types::ModelId;

    use super::*;

    fn pet() -> Instance {
        let mut pet = Instance::new("Pet", ModelId::new("p1").unwrap());
        pet.set("name", Some(Value::from("Firulais")))
            .set("legs", Some(Value::Integer(4)));
        pet
    }

    fn matches(spec: &str, value: impl Into<Value>) -> bool {
        Filter::parse(spec, value.into()).unwrap().matches(&pet())
    }

    #[test]
    fn op_defaults_to_eq() {
        let filter = Filter::parse("name", Value::from("x")).unwrap();
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.field, "name");
    }

    #[test]
    fn unknown_op_is_rejected() {
        let err = Filter::parse("name__foo", Value::from("x")).unwrap_err();
        assert_eq!(err.to_string(), "Filter foo does not exist");
    }

    #[test]
    fn comparisons() {
        assert!(matches("name", "Firulais"));
        assert!(matches("name__ne", "Rex"));
        assert!(matches("legs__gt", 3));
        assert!(matches("legs__gte", 4));
        assert!(!matches("legs__lt", 4));
        assert!(matches("legs__lte", 4.0));
        assert!(matches("legs", 4.0));
        assert!(matches("name__startswith", "Fir"));
        assert!(matches("name__endswith", "lais"));
        assert!(!matches("legs__startswith", "4"));
        assert!(matches("id", "p1"));
    }

    #[test]
    fn missing_values() {
        assert!(!matches("age__lt", 10));
        assert!(!matches("age__gte", 0));
        assert!(!matches("age__startswith", "a"));
        assert!(!matches("age", 1));
        assert!(matches("age__ne", 1));
    }
}
