//! Model schemas and the registry that resolves them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tessera_codec::{FieldDescriptor, FieldKind};
use tessera_types::Namespace;

use crate::error::{OrmError, OrmResult};

/// What happens to related instances when the owner is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OnDelete {
    /// Unrelate the inverse side and keep the related instances.
    #[default]
    SetNull,
    /// Delete the related instances too.
    Cascade,
    /// Refuse to delete while related instances exist.
    Restrict,
}

/// Storage shape of a relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// A pointer held as a field of the owner's record hash.
    Foreign,
    /// An unordered set of ids.
    Set,
    /// Ids ranked by the `sort_key` field of the related instances.
    SortedSet { sort_key: String },
}

impl RelationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Foreign => "foreign",
            Self::Set => "set",
            Self::SortedSet { .. } => "sorted set",
        }
    }
}

/// A relation declared on a model.
#[derive(Clone, Debug)]
pub struct RelationSpec {
    name: String,
    kind: RelationKind,
    target: String,
    inverse: Option<String>,
    on_delete: OnDelete,
    private: bool,
}

impl RelationSpec {
    pub fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            inverse: None,
            on_delete: OnDelete::default(),
            private: false,
        }
    }

    pub fn foreign(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::Foreign, target)
    }

    pub fn set(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::Set, target)
    }

    pub fn sorted_set(
        name: impl Into<String>,
        target: impl Into<String>,
        sort_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            RelationKind::SortedSet {
                sort_key: sort_key.into(),
            },
            target,
        )
    }

    /// Name of the relation on the target model pointing back here.
    pub fn inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn on_delete(mut self, policy: OnDelete) -> Self {
        self.on_delete = policy;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn inverse_name(&self) -> Option<&str> {
        self.inverse.as_deref()
    }

    pub fn delete_policy(&self) -> OnDelete {
        self.on_delete
    }

    pub fn is_private(&self) -> bool {
        self.private
    }
}

/// Declared shape of one model: its fields, relations and flags.
#[derive(Clone)]
pub struct ModelSchema {
    name: String,
    prefix: Option<String>,
    fields: Vec<FieldDescriptor>,
    relations: Vec<RelationSpec>,
    notify: bool,
    permission_holder: bool,
    ns: Namespace,
}

impl ModelSchema {
    /// A schema for the model type `name`, e.g. `"Pet"`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let ns = Namespace::for_model(None, &name);
        Self {
            name,
            prefix: None,
            fields: Vec::new(),
            relations: Vec::new(),
            notify: false,
            permission_holder: false,
            ns,
        }
    }

    /// Place every key of the model under `prefix:`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.ns = Namespace::for_model(Some(&prefix), &self.name);
        self.prefix = Some(prefix);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.relations.push(relation);
        self
    }

    /// Publish change events for this model.
    pub fn notify(mut self) -> Self {
        self.notify = true;
        self
    }

    /// Instances of this model hold permission grants.
    pub fn permission_holder(mut self) -> Self {
        self.permission_holder = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bound_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name() == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldDescriptor::name)
    }

    pub fn notifies(&self) -> bool {
        self.notify
    }

    pub fn is_permission_holder(&self) -> bool {
        self.permission_holder
    }

    fn check_names(&self) -> OrmResult<()> {
        let mut seen = BTreeSet::new();
        let names = self
            .fields
            .iter()
            .map(FieldDescriptor::name)
            .chain(self.relations.iter().map(RelationSpec::name));
        for name in names {
            if name.is_empty() || name == "id" || name.contains(':') {
                return Err(OrmError::ImproperlyConfigured(format!(
                    "{}: invalid field name {name:?}",
                    self.name
                )));
            }
            if !seen.insert(name) {
                return Err(OrmError::ImproperlyConfigured(format!(
                    "{}: field {name} declared twice",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("ns", &self.ns)
            .field("fields", &self.field_names().collect::<Vec<_>>())
            .field("relations", &self.relations)
            .field("notify", &self.notify)
            .field("permission_holder", &self.permission_holder)
            .finish()
    }
}

/// Collects schemas before [`RegistryBuilder::build`] checks them.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: Vec<ModelSchema>,
}

impl RegistryBuilder {
    pub fn model(mut self, schema: ModelSchema) -> Self {
        self.models.push(schema);
        self
    }

    /// Resolve every relation and reject inconsistent declarations.
    pub fn build(self) -> OrmResult<Registry> {
        let mut models = BTreeMap::new();
        for schema in self.models {
            schema.check_names()?;
            if models.contains_key(schema.name()) {
                return Err(OrmError::ImproperlyConfigured(format!(
                    "model {} registered twice",
                    schema.name()
                )));
            }
            models.insert(schema.name().to_string(), schema);
        }
        let registry = Registry { models };
        for schema in registry.models.values() {
            for relation in schema.relations() {
                registry.check_relation(schema, relation)?;
            }
        }
        Ok(registry)
    }
}

/// The resolved set of models an engine serves.
#[derive(Debug, Default)]
pub struct Registry {
    models: BTreeMap<String, ModelSchema>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, model: &str) -> OrmResult<&ModelSchema> {
        self.models
            .get(model)
            .ok_or_else(|| OrmError::UnboundModel(model.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The relation on the target of `relation` pointing back at its owner.
    pub fn inverse_of(&self, relation: &RelationSpec) -> OrmResult<Option<&RelationSpec>> {
        let Some(inverse) = relation.inverse_name() else {
            return Ok(None);
        };
        let target = self.get(relation.target())?;
        target.get_relation(inverse).map(Some).ok_or_else(|| {
            OrmError::ImproperlyConfigured(format!(
                "{} has no relation {inverse}",
                target.name()
            ))
        })
    }

    fn check_relation(&self, owner: &ModelSchema, relation: &RelationSpec) -> OrmResult<()> {
        let misconfigured = |what: String| {
            OrmError::ImproperlyConfigured(format!("{}.{}: {what}", owner.name(), relation.name()))
        };

        let target = self
            .models
            .get(relation.target())
            .ok_or_else(|| misconfigured(format!("unknown target model {}", relation.target())))?;

        if let RelationKind::SortedSet { sort_key } = relation.kind() {
            let field = target
                .get_field(sort_key)
                .ok_or_else(|| {
                    misconfigured(format!("{} has no field {sort_key}", target.name()))
                })?;
            if !matches!(
                field.kind(),
                FieldKind::Integer | FieldKind::Float | FieldKind::Datetime | FieldKind::Bool
            ) {
                return Err(misconfigured(format!(
                    "sort field {sort_key} is a {} field",
                    field.kind()
                )));
            }
        }

        if let Some(inverse) = relation.inverse_name() {
            let back = target
                .get_relation(inverse)
                .ok_or_else(|| {
                    misconfigured(format!("{} has no relation {inverse}", target.name()))
                })?;
            if back.target() != owner.name() {
                return Err(misconfigured(format!(
                    "inverse {inverse} relates {}, not {}",
                    back.target(),
                    owner.name()
                )));
            }
            if back.inverse_name().is_some_and(|n| n != relation.name()) {
                return Err(misconfigured(format!(
                    "inverse {inverse} points back to {}",
                    back.inverse_name().unwrap_or_default()
                )));
            }
        }
        Ok(())
    }
}
