use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// A permission `path[/restriction]`.
///
/// Paths are colon-delimited, `org:fleet:truck`. A grant on a path extends
/// to every path below it; a restricted grant only to requests carrying the
/// same restriction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Grant {
    path: String,
    restriction: Option<String>,
}

impl Grant {
    pub fn new(path: impl Into<String>, restriction: Option<String>) -> Result<Self, AuthError> {
        let path = path.into();
        let valid_path = !path.is_empty()
            && !path.contains('/')
            && path.split(':').all(|segment| !segment.is_empty());
        let valid_restriction = restriction
            .as_deref()
            .map_or(true, |r| !r.is_empty() && !r.contains('/'));
        if !valid_path || !valid_restriction {
            let spec = match &restriction {
                Some(r) => format!("{path}/{r}"),
                None => path,
            };
            return Err(AuthError::InvalidSpec(spec));
        }
        Ok(Self { path, restriction })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn restriction(&self) -> Option<&str> {
        self.restriction.as_deref()
    }

    /// Whether `ancestor` is `path` or one of its colon-component ancestors.
    pub fn path_includes(ancestor: &str, path: &str) -> bool {
        path.strip_prefix(ancestor)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    }

    /// Whether holding `self` implies holding `other`.
    pub fn covers(&self, other: &Grant) -> bool {
        Self::path_includes(&self.path, &other.path)
            && (self.restriction.is_none() || self.restriction == other.restriction)
    }
}

impl FromStr for Grant {
    type Err = AuthError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        match spec.split_once('/') {
            Some((path, restriction)) => Self::new(path, Some(restriction.to_string())),
            None => Self::new(spec, None),
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.restriction {
            Some(r) => write!(f, "{}/{r}", self.path),
            None => f.write_str(&self.path),
        }
    }
}
