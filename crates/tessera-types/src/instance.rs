use std::collections::BTreeMap;
use std::fmt;

use crate::id::ModelId;
use crate::value::Value;

/// A record of some model: an id plus its field values.
///
/// Besides the current values an instance remembers the values it had when
/// it was last written to or read from the store. Index maintenance compares
/// the two to find out which derived entries are stale.
///
/// Two instances are equal when they belong to the same model and share an
/// id, regardless of their values.
#[derive(Clone)]
pub struct Instance {
    model: String,
    id: ModelId,
    values: BTreeMap<String, Value>,
    persisted: Option<BTreeMap<String, Value>>,
}

impl Instance {
    /// A transient instance holding no values.
    pub fn new(model: impl Into<String>, id: ModelId) -> Self {
        Self {
            model: model.into(),
            id,
            values: BTreeMap::new(),
            persisted: None,
        }
    }

    /// Name of the model this instance belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    /// Current value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Current value of a text field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_text)
    }

    /// Set or clear a field value.
    pub fn set(&mut self, field: impl Into<String>, value: Option<Value>) -> &mut Self {
        let field = field.into();
        match value {
            Some(value) => {
                self.values.insert(field, value);
            }
            None => {
                self.values.remove(&field);
            }
        }
        self
    }

    /// All current values, ordered by field name.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Whether this instance has been saved to or loaded from the store.
    pub fn is_persisted(&self) -> bool {
        self.persisted.is_some()
    }

    /// The value a field had at the last save or load.
    pub fn persisted_value(&self, field: &str) -> Option<&Value> {
        self.persisted.as_ref().and_then(|p| p.get(field))
    }

    /// Whether a field differs from its persisted value.
    ///
    /// Every set field of a transient instance counts as changed.
    pub fn is_changed(&self, field: &str) -> bool {
        match &self.persisted {
            Some(persisted) => persisted.get(field) != self.values.get(field),
            None => self.values.contains_key(field),
        }
    }

    /// Record the current values as the persisted snapshot.
    pub fn mark_persisted(&mut self) {
        self.persisted = Some(self.values.clone());
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.id == other.id
    }
}

impl Eq for Instance {}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model)
            .field("id", &self.id)
            .field("values", &self.values)
            .field("persisted", &self.is_persisted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModelId {
        ModelId::new(s).unwrap()
    }

    #[test]
    fn set_and_clear_values() {
        let mut inst = Instance::new("Ship", id("s1"));
        inst.set("code", Some("A12".into()));
        assert_eq!(inst.text("code"), Some("A12"));
        inst.set("code", None);
        assert!(inst.get("code").is_none());
    }

    #[test]
    fn transient_fields_are_changed() {
        let mut inst = Instance::new("Ship", id("s1"));
        assert!(!inst.is_changed("code"));
        inst.set("code", Some("A12".into()));
        assert!(inst.is_changed("code"));
        assert!(!inst.is_persisted());
    }

    #[test]
    fn snapshot_tracks_changes() {
        let mut inst = Instance::new("Ship", id("s1"));
        inst.set("code", Some("A12".into()));
        inst.mark_persisted();
        assert!(!inst.is_changed("code"));

        inst.set("code", Some("B7".into()));
        assert!(inst.is_changed("code"));
        assert_eq!(inst.persisted_value("code"), Some(&Value::from("A12")));

        inst.set("code", None);
        assert!(inst.is_changed("code"));
    }

    #[test]
    fn equality_is_by_model_and_id() {
        let mut a = Instance::new("Ship", id("s1"));
        a.set("name", Some("one".into()));
        let b = Instance::new("Ship", id("s1"));
        let c = Instance::new("Boat", id("s1"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
