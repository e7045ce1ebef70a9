//! Validation, persistence and lookup of model instances.

use serde_json::{Map, Value as Json};
use tessera_codec::{
    hash_secret, is_hashed, BadField, FieldDescriptor, FieldKind, Storage, ValidationErrors,
};
use tessera_index::{IndexError, TreeIndex, UniqueIndex};
use tessera_store::Batch;
use tessera_types::{Instance, ModelId, Value};

use crate::engine::Engine;
use crate::error::{OrmError, OrmResult};
use crate::events::ChangeEvent;
use crate::schema::ModelSchema;

impl Engine {
    // ---- Construction ----

    /// A transient instance with a fresh id and every default applied.
    pub fn new_instance(&self, model: &str) -> OrmResult<Instance> {
        let schema = self.schema(model)?;
        let mut instance = Instance::new(schema.name(), self.ids().generate());
        for field in schema.fields() {
            instance.set(field.name(), field.init(None));
        }
        Ok(instance)
    }

    /// Validate raw input into a transient instance.
    ///
    /// Every field is checked and all failures are returned together.
    /// Fields that are not fillable ignore the input and take their default.
    pub fn validate(&self, model: &str, raw: &Map<String, Json>) -> OrmResult<Instance> {
        let schema = self.schema(model)?;
        let mut instance = Instance::new(schema.name(), self.ids().generate());
        let mut errors = ValidationErrors::new();

        for field in schema.fields() {
            let input = if field.is_fillable() {
                raw.get(field.name())
            } else {
                None
            };
            match self.validate_field(schema, field, instance.id(), input)? {
                Ok(value) => {
                    instance.set(field.name(), value);
                }
                Err(bad) => errors.push(bad),
            }
        }

        errors.into_result()?;
        Ok(instance)
    }

    /// Validate and save in one step.
    pub fn create(&self, model: &str, raw: &Map<String, Json>) -> OrmResult<Instance> {
        let mut instance = self.validate(model, raw)?;
        self.save(&mut instance)?;
        Ok(instance)
    }

    /// Validate the supplied fillable fields into `instance`, then save it.
    ///
    /// Fields absent from `raw` or given as null keep their current value.
    /// Nothing is written when any field fails.
    pub fn update(&self, instance: &mut Instance, raw: &Map<String, Json>) -> OrmResult<()> {
        let schema = self.schema(instance.model())?;
        let mut errors = ValidationErrors::new();
        let mut accepted = Vec::new();

        for field in schema.fields().iter().filter(|f| f.is_fillable()) {
            let Some(input) = raw.get(field.name()).filter(|v| !v.is_null()) else {
                continue;
            };
            match self.validate_field(schema, field, instance.id(), Some(input))? {
                Ok(value) => accepted.push((field.name(), value)),
                Err(bad) => errors.push(bad),
            }
        }

        errors.into_result()?;
        for (name, value) in accepted {
            instance.set(name, value);
        }
        self.save(instance)
    }

    /// Codec checks followed by the uniqueness check. Store failures are the
    /// outer error, field failures the inner one.
    fn validate_field(
        &self,
        schema: &ModelSchema,
        field: &FieldDescriptor,
        id: &ModelId,
        input: Option<&Json>,
    ) -> OrmResult<Result<Option<Value>, BadField>> {
        let value = match field.validate(input) {
            Ok(value) => value,
            Err(bad) => return Ok(Err(bad)),
        };
        if !field.is_unique() {
            return Ok(Ok(value));
        }
        let candidate = value.as_ref().map(|v| field.serialize(v)).transpose()?;
        let index = UniqueIndex::new(schema.namespace(), field.name());
        match index.check_unique(self.store(), id, candidate.as_deref()) {
            Ok(()) => Ok(Ok(value)),
            Err(IndexError::NotUnique(bad)) => Ok(Err(bad)),
            Err(e) => Err(e.into()),
        }
    }

    // ---- Persistence ----

    /// Write `instance` and every derived entry in one atomic batch.
    ///
    /// Index maintenance compares against the persisted snapshot, so only
    /// changed values move. Relation pointers on the record are untouched.
    pub fn save(&self, instance: &mut Instance) -> OrmResult<()> {
        let schema = self.schema(instance.model())?;
        let ns = schema.namespace();
        let id = instance.id().clone();
        let obj = ns.obj(&id);

        for field in schema.fields().iter().filter(|f| f.kind() == FieldKind::Secret) {
            if let Some(Value::Text(plain)) = instance.get(field.name()) {
                if !is_hashed(plain) {
                    let hashed = hash_secret(plain);
                    instance.set(field.name(), Some(Value::Text(hashed)));
                }
            }
        }

        let mut batch = Batch::new();
        batch.hset(&obj, "id", id.as_str());
        for field in schema.fields() {
            let name = field.name();
            let value = instance.get(name);
            let stored = value.map(|v| field.serialize(v)).transpose()?;
            let old = instance
                .persisted_value(name)
                .map(|v| field.serialize(v))
                .transpose()?;

            match field.storage() {
                Storage::Record => match &stored {
                    Some(stored) => batch.hset(&obj, name, stored),
                    None => batch.hdel(&obj, name),
                },
                Storage::Geo => match value.and_then(Value::as_location) {
                    Some(location) => batch.geoadd(ns.geo(name), id.as_str(), *location),
                    None => batch.georem(ns.geo(name), id.as_str()),
                },
                Storage::DictKey => {
                    let key = ns.dict(&id, name);
                    batch.del(&key);
                    if let Some(stored) = &stored {
                        batch.hset(key, name, stored);
                    }
                    &mut batch
                }
            };

            if field.is_unique() {
                UniqueIndex::new(ns, name).stage_save(
                    &mut batch,
                    &id,
                    old.as_deref(),
                    stored.as_deref(),
                );
            }
            if field.kind() == FieldKind::TreeIndex {
                TreeIndex::new(ns, name).stage_save(
                    &mut batch,
                    &id,
                    old.as_deref(),
                    stored.as_deref(),
                );
            }
        }
        batch.sadd(ns.members(), id.as_str());

        let created = !instance.is_persisted();
        tracing::debug!(model = schema.name(), %id, ops = batch.len(), created, "saving");
        self.store().execute(batch)?;
        instance.mark_persisted();

        let event = if created {
            ChangeEvent::Create
        } else {
            ChangeEvent::Update
        };
        self.notify(schema, event, instance);
        Ok(())
    }

    // ---- Lookup ----

    /// The instance of `model` with `id`, or `None`.
    pub fn get(&self, model: &str, id: &str) -> OrmResult<Option<Instance>> {
        let schema = self.schema(model)?;
        match ModelId::new(id) {
            Ok(id) => self.load(schema, &id),
            Err(_) => Ok(None),
        }
    }

    pub fn get_or_err(&self, model: &str, id: &str) -> OrmResult<Instance> {
        self.get(model, id)?
            .ok_or_else(|| OrmError::not_found(model, id))
    }

    /// Resolve an instance through the unique index of `field`.
    ///
    /// `value` is the stored text form, e.g. `"42"` for an integer.
    pub fn get_by(&self, model: &str, field: &str, value: &str) -> OrmResult<Option<Instance>> {
        let schema = self.schema(model)?;
        let descriptor = schema.get_field(field).ok_or_else(|| OrmError::UnknownField {
            model: model.to_string(),
            field: field.to_string(),
        })?;
        if !descriptor.is_unique() {
            return Err(OrmError::ImproperlyConfigured(format!(
                "{model}.{field} is not indexed"
            )));
        }
        match UniqueIndex::new(schema.namespace(), field).lookup(self.store(), value)? {
            Some(id) => self.load(schema, &id),
            None => Ok(None),
        }
    }

    pub fn get_by_or_err(&self, model: &str, field: &str, value: &str) -> OrmResult<Instance> {
        self.get_by(model, field, value)?
            .ok_or_else(|| OrmError::not_found(model, format!("{field}={value}")))
    }

    /// Every live instance of `model`, ordered by id.
    pub fn get_all(&self, model: &str) -> OrmResult<Vec<Instance>> {
        let schema = self.schema(model)?;
        let ids = self
            .store()
            .smembers(&schema.namespace().members())?
            .into_iter()
            .filter_map(|raw| ModelId::new(raw).ok())
            .collect::<Vec<_>>();
        self.load_all(schema, &ids)
    }

    pub fn count(&self, model: &str) -> OrmResult<usize> {
        let schema = self.schema(model)?;
        Ok(self.store().scard(&schema.namespace().members())?)
    }

    pub fn exists(&self, model: &str, id: &str) -> OrmResult<bool> {
        let schema = self.schema(model)?;
        Ok(self.store().sismember(&schema.namespace().members(), id)?)
    }

    /// Replace `instance` with its stored state.
    pub fn reload(&self, instance: &mut Instance) -> OrmResult<()> {
        let schema = self.schema(instance.model())?;
        let fresh = self
            .load(schema, instance.id())?
            .ok_or_else(|| OrmError::not_found(schema.name(), instance.id()))?;
        *instance = fresh;
        Ok(())
    }

    pub(crate) fn load(&self, schema: &ModelSchema, id: &ModelId) -> OrmResult<Option<Instance>> {
        let ns = schema.namespace();
        let record = self.store().hgetall(&ns.obj(id))?;
        if record.is_empty() {
            return Ok(None);
        }

        let mut instance = Instance::new(schema.name(), id.clone());
        for field in schema.fields() {
            let name = field.name();
            let value = match field.storage() {
                Storage::Record => field.deserialize(record.get(name).map(String::as_str))?,
                Storage::Geo => self
                    .store()
                    .geopos(&ns.geo(name), id.as_str())?
                    .map(Value::Location),
                Storage::DictKey => {
                    let stored = self.store().hget(&ns.dict(id, name), name)?;
                    field
                        .deserialize(stored.as_deref())?
                        .or_else(|| Some(Value::Dict(Map::new())))
                }
            };
            instance.set(name, value);
        }
        instance.mark_persisted();
        Ok(Some(instance))
    }

    /// Load `ids` in order, skipping those that no longer exist.
    pub(crate) fn load_all(
        &self,
        schema: &ModelSchema,
        ids: &[ModelId],
    ) -> OrmResult<Vec<Instance>> {
        let mut instances = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(instance) = self.load(schema, id)? {
                instances.push(instance);
            }
        }
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tessera_codec::{check_secret, FieldErrorKind};
    use tessera_types::Location;

    use super::*;
    use crate::testing::{raw, zoo};

    // ------------------------------------------------------------------
    // validate / create
    // ------------------------------------------------------------------

    #[test]
    fn create_writes_record_and_membership() {
        let engine = zoo();
        let pet = engine
            .create("Pet", &raw(json!({"name": "Rex", "age": "3"})))
            .unwrap();
        let obj = format!("pet:{}:obj", pet.id());

        assert_eq!(engine.store().hget(&obj, "id").unwrap().as_deref(), Some(pet.id().as_str()));
        assert_eq!(engine.store().hget(&obj, "name").unwrap().as_deref(), Some("Rex"));
        assert_eq!(engine.store().hget(&obj, "age").unwrap().as_deref(), Some("3"));
        assert!(engine.exists("Pet", pet.id().as_str()).unwrap());
        assert_eq!(engine.count("Pet").unwrap(), 1);
        assert!(pet.is_persisted());
    }

    #[test]
    fn field_errors_are_accumulated() {
        let engine = zoo();
        let err = engine
            .validate("Pet", &raw(json!({"age": "old", "kind": "dragon"})))
            .unwrap_err();
        let OrmError::Validation(errors) = err else {
            panic!("expected validation errors, got {err:?}");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.has_field("name"));
        assert!(errors.has_field("age"));
        assert!(errors.has_field("kind"));
        assert_eq!(engine.count("Pet").unwrap(), 0);
    }

    #[test]
    fn non_fillable_fields_take_their_default() {
        let engine = zoo();
        let pet = engine
            .validate("Pet", &raw(json!({"name": "Rex", "legs": 3})))
            .unwrap();
        assert_eq!(pet.get("legs"), Some(&Value::Integer(4)));
    }

    #[test]
    fn unknown_model_is_unbound() {
        let engine = zoo();
        assert!(matches!(
            engine.validate("Car", &Map::new()),
            Err(OrmError::UnboundModel(_))
        ));
    }

    // ------------------------------------------------------------------
    // unique index
    // ------------------------------------------------------------------

    #[test]
    fn second_holder_of_unique_value_fails() {
        let engine = zoo();
        let first = engine
            .create("Person", &raw(json!({"name": "Ann", "email": "ann@zoo.org"})))
            .unwrap();

        let err = engine
            .create("Person", &raw(json!({"name": "Bob", "email": "ann@zoo.org"})))
            .unwrap_err();
        let OrmError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        let bad = errors.iter().next().unwrap();
        assert_eq!(bad.kind, FieldErrorKind::NotUnique);
        assert_eq!(bad.field, "email");

        let found = engine.get_by("Person", "email", "ann@zoo.org").unwrap().unwrap();
        assert_eq!(found, first);
    }

    #[test]
    fn resaving_own_unique_value_succeeds() {
        let engine = zoo();
        let mut ann = engine
            .create("Person", &raw(json!({"name": "Ann", "email": "ann@zoo.org"})))
            .unwrap();
        engine
            .update(&mut ann, &raw(json!({"email": "ann@zoo.org", "name": "Anne"})))
            .unwrap();
        assert_eq!(ann.text("name"), Some("Anne"));
    }

    #[test]
    fn changed_unique_value_moves_mapping() {
        let engine = zoo();
        let mut ann = engine
            .create("Person", &raw(json!({"name": "Ann", "email": "ann@zoo.org"})))
            .unwrap();
        engine
            .update(&mut ann, &raw(json!({"email": "ann@mail.org"})))
            .unwrap();

        assert!(engine.get_by("Person", "email", "ann@zoo.org").unwrap().is_none());
        assert_eq!(
            engine.get_by_or_err("Person", "email", "ann@mail.org").unwrap(),
            ann
        );
        engine
            .create("Person", &raw(json!({"name": "Bob", "email": "ann@zoo.org"})))
            .unwrap();
    }

    #[test]
    fn get_by_needs_a_unique_field() {
        let engine = zoo();
        assert!(matches!(
            engine.get_by("Person", "name", "Ann"),
            Err(OrmError::ImproperlyConfigured(_))
        ));
        assert!(matches!(
            engine.get_by("Person", "height", "2"),
            Err(OrmError::UnknownField { .. })
        ));
    }

    // ------------------------------------------------------------------
    // update
    // ------------------------------------------------------------------

    #[test]
    fn update_touches_supplied_fillable_fields_only() {
        let engine = zoo();
        let mut pet = engine
            .create("Pet", &raw(json!({"name": "Rex", "age": 3})))
            .unwrap();
        engine
            .update(&mut pet, &raw(json!({"age": 4, "name": null, "legs": 2})))
            .unwrap();

        let stored = engine.get_or_err("Pet", pet.id().as_str()).unwrap();
        assert_eq!(stored.text("name"), Some("Rex"));
        assert_eq!(stored.get("age"), Some(&Value::Integer(4)));
        assert_eq!(stored.get("legs"), Some(&Value::Integer(4)));
    }

    #[test]
    fn failed_update_writes_nothing() {
        let engine = zoo();
        let mut pet = engine
            .create("Pet", &raw(json!({"name": "Rex", "age": 3})))
            .unwrap();
        let err = engine
            .update(&mut pet, &raw(json!({"age": "x", "name": "Max"})))
            .unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
        assert_eq!(pet.text("name"), Some("Rex"));
        let stored = engine.get_or_err("Pet", pet.id().as_str()).unwrap();
        assert_eq!(stored.text("name"), Some("Rex"));
    }

    // ------------------------------------------------------------------
    // load
    // ------------------------------------------------------------------

    #[test]
    fn stored_values_decode_by_kind() {
        let engine = zoo();
        let created = engine
            .create(
                "Person",
                &raw(json!({
                    "name": "Ann",
                    "email": "ann@zoo.org",
                    "password": "hunter2",
                    "home": "-99.1,19.4",
                    "prefs": {"lang": "es"},
                    "joined": "2016-03-31T10:00:00Z",
                })),
            )
            .unwrap();

        let ann = engine.get_or_err("Person", created.id().as_str()).unwrap();
        assert_eq!(ann.get("home"), Some(&Value::Location(Location::new(-99.1, 19.4).unwrap())));
        assert_eq!(ann.get("prefs").and_then(Value::as_dict).unwrap()["lang"], json!("es"));
        assert_eq!(ann.get("active"), Some(&Value::Bool(true)));
        assert!(check_secret("hunter2", ann.text("password").unwrap()));
        assert_eq!(ann.values(), created.values());
    }

    #[test]
    fn missing_dict_loads_empty() {
        let engine = zoo();
        let ann = engine
            .create("Person", &raw(json!({"name": "Ann", "email": "a@z.org"})))
            .unwrap();
        let ann = engine.get_or_err("Person", ann.id().as_str()).unwrap();
        assert_eq!(ann.get("prefs"), Some(&Value::Dict(Map::new())));
    }

    #[test]
    fn plain_secrets_are_hashed_on_save() {
        let engine = zoo();
        let mut ann = engine.new_instance("Person").unwrap();
        ann.set("name", Some("Ann".into()))
            .set("email", Some("a@z.org".into()))
            .set("password", Some("plain".into()));
        engine.save(&mut ann).unwrap();

        let stored = engine
            .store()
            .hget(&format!("person:{}:obj", ann.id()), "password")
            .unwrap()
            .unwrap();
        assert!(check_secret("plain", &stored));
        assert_eq!(ann.text("password"), Some(stored.as_str()));
    }

    #[test]
    fn missing_ids_resolve_to_none() {
        let engine = zoo();
        assert!(engine.get("Pet", "nope").unwrap().is_none());
        assert!(engine.get("Pet", "").unwrap().is_none());
        assert!(matches!(
            engine.get_or_err("Pet", "nope"),
            Err(OrmError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn reload_refreshes_values() {
        let engine = zoo();
        let mut pet = engine
            .create("Pet", &raw(json!({"name": "Rex", "age": 3})))
            .unwrap();
        let mut other = engine.get_or_err("Pet", pet.id().as_str()).unwrap();
        engine.update(&mut other, &raw(json!({"age": 9}))).unwrap();

        engine.reload(&mut pet).unwrap();
        assert_eq!(pet.get("age"), Some(&Value::Integer(9)));
        assert!(!pet.is_changed("age"));
    }

    #[test]
    fn get_all_is_ordered_by_id() {
        let engine = zoo();
        for name in ["a", "b", "c"] {
            engine.create("Pet", &raw(json!({"name": name}))).unwrap();
        }
        let all = engine.get_all("Pet").unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id() < w[1].id()));
    }
}
