use std::fmt;

use crate::id::ModelId;
use crate::naming::snake_case;

/// Key prefix of a model, `[prefix:]snake_case(TypeName)`.
///
/// Every key a model owns is derived from its namespace:
///
/// | Key | Holds |
/// |-----|-------|
/// | `ns:members` | live ids |
/// | `ns:<id>:obj` | record hash |
/// | `ns:index_<f>` | unique index |
/// | `ns:tree_<f>:<v>` / `ns:subtree_<f>:<p>` | tree index |
/// | `ns:geo_<f>` | geo index |
/// | `ns:<id>:dict_<f>` | dict field |
/// | `ns:<id>:srel_<f>` / `ns:<id>:zrel_<f>` | multi relations |
/// | `ns:<id>:allow` | permission grants |
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    /// Namespace of the model type `type_name`, optionally under a bound prefix.
    pub fn for_model(prefix: Option<&str>, type_name: &str) -> Self {
        let base = snake_case(type_name);
        match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => Self(format!("{prefix}:{base}")),
            None => Self(base),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn members(&self) -> String {
        format!("{}:members", self.0)
    }

    /// Fully qualified name of an instance, `ns:<id>`.
    pub fn fqn(&self, id: &ModelId) -> String {
        format!("{}:{id}", self.0)
    }

    pub fn obj(&self, id: &ModelId) -> String {
        format!("{}:{id}:obj", self.0)
    }

    pub fn index(&self, field: &str) -> String {
        format!("{}:index_{field}", self.0)
    }

    pub fn tree(&self, field: &str, value: &str) -> String {
        format!("{}:tree_{field}:{value}", self.0)
    }

    pub fn subtree(&self, field: &str, prefix: &str) -> String {
        format!("{}:subtree_{field}:{prefix}", self.0)
    }

    pub fn geo(&self, field: &str) -> String {
        format!("{}:geo_{field}", self.0)
    }

    pub fn dict(&self, id: &ModelId, field: &str) -> String {
        format!("{}:{id}:dict_{field}", self.0)
    }

    pub fn srel(&self, id: &ModelId, field: &str) -> String {
        format!("{}:{id}:srel_{field}", self.0)
    }

    pub fn zrel(&self, id: &ModelId, field: &str) -> String {
        format!("{}:{id}:zrel_{field}", self.0)
    }

    pub fn allow(&self, id: &ModelId) -> String {
        format!("{}:{id}:allow", self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", self.0)
    }
}
