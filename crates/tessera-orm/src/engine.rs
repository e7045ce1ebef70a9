use std::fmt;
use std::sync::Arc;

use tessera_auth::{ensure_scripts, PermissionHolder};
use tessera_codec::{FieldDescriptor, FieldKind};
use tessera_index::TreeIndex;
use tessera_query::{Loader, QueryError, QueryResult, QuerySet, ScanSource};
use tessera_store::{KvStore, Subscription};
use tessera_types::{IdGenerator, Instance, ModelId};

use crate::config::EngineConfig;
use crate::error::{OrmError, OrmResult};
use crate::schema::{ModelSchema, Registry};

/// Entry point binding a registry of models to a store.
///
/// Model operations take the model name, or the instance they act on, and
/// fail with [`OrmError::UnboundModel`] for models outside the registry.
pub struct Engine {
    store: Arc<dyn KvStore>,
    registry: Registry,
    config: EngineConfig,
    ids: Box<dyn IdGenerator>,
}

impl Engine {
    /// Bind `registry` to `store` with the default configuration.
    pub fn new(store: Arc<dyn KvStore>, registry: Registry) -> OrmResult<Self> {
        Self::with_config(store, registry, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn KvStore>,
        registry: Registry,
        config: EngineConfig,
    ) -> OrmResult<Self> {
        config.validate()?;
        ensure_scripts(store.as_ref())?;
        let ids = config.build_id_generator();
        tracing::info!(
            models = registry.len(),
            id_generator = ?config.id_generator,
            notify = config.notify,
            "engine ready"
        );
        Ok(Self {
            store,
            registry,
            config,
            ids,
        })
    }

    /// An engine over a fresh in-memory store.
    pub fn in_memory(registry: Registry, config: EngineConfig) -> OrmResult<Self> {
        let store = Arc::new(config.memory_store());
        Self::with_config(store, registry, config)
    }

    /// Replace the configured id generator.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self, model: &str) -> OrmResult<&ModelSchema> {
        self.registry.get(model)
    }

    pub(crate) fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    // ---- Queries ----

    /// Every live instance of `model`, lazily.
    pub fn query(&self, model: &str) -> OrmResult<QuerySet<'_>> {
        let schema = self.schema(model)?;
        Ok(self.query_over(schema, ScanSource::set(schema.namespace().members())))
    }

    pub(crate) fn query_over<'a>(
        &'a self,
        schema: &'a ModelSchema,
        source: ScanSource,
    ) -> QuerySet<'a> {
        let loader: Loader<'a> = Box::new(move |id: &ModelId| -> QueryResult<Option<Instance>> {
            self.load(schema, id).map_err(QueryError::load)
        });
        QuerySet::new(
            self.store(),
            schema.name(),
            schema.field_names(),
            source,
            loader,
        )
        .page_size(self.config.scan_page_size)
    }

    /// Instances whose tree value is `query` or one of its ancestors, by id.
    pub fn tree_match(&self, model: &str, field: &str, query: &str) -> OrmResult<Vec<Instance>> {
        let schema = self.schema(model)?;
        let field = tree_field(schema, field)?;
        let ids = TreeIndex::new(schema.namespace(), field.name())
            .tree_match(self.store(), query)?;
        self.load_all(schema, &ids)
    }

    /// Instances whose tree value is `query` or one of its descendants, by id.
    pub fn tree_descendants(
        &self,
        model: &str,
        field: &str,
        query: &str,
    ) -> OrmResult<Vec<Instance>> {
        let schema = self.schema(model)?;
        let field = tree_field(schema, field)?;
        let ids = TreeIndex::new(schema.namespace(), field.name())
            .tree_descendants(self.store(), query)?;
        self.load_all(schema, &ids)
    }

    // ---- Permissions ----

    /// The grant path naming `instance`, `ns:<id>[/restrict]`.
    pub fn permission(&self, instance: &Instance, restrict: Option<&str>) -> OrmResult<String> {
        let fqn = self.schema(instance.model())?.namespace().fqn(instance.id());
        Ok(match restrict {
            Some(restrict) => format!("{fqn}/{restrict}"),
            None => fqn,
        })
    }

    /// The grant set held by `instance`.
    pub fn permissions(&self, instance: &Instance) -> OrmResult<PermissionHolder<'_>> {
        let schema = self.schema(instance.model())?;
        if !schema.is_permission_holder() {
            return Err(OrmError::ImproperlyConfigured(format!(
                "{} does not hold permissions",
                schema.name()
            )));
        }
        Ok(PermissionHolder::new(
            self.store(),
            schema.namespace().allow(instance.id()),
        ))
    }

    // ---- Change events ----

    /// Events for every instance of `model`.
    pub fn subscribe(&self, model: &str) -> OrmResult<Subscription> {
        let schema = self.schema(model)?;
        Ok(self.store.subscribe(schema.namespace().as_str())?)
    }

    /// Events for one instance.
    pub fn subscribe_instance(&self, instance: &Instance) -> OrmResult<Subscription> {
        let schema = self.schema(instance.model())?;
        Ok(self.store.subscribe(&schema.namespace().obj(instance.id()))?)
    }
}

fn tree_field<'a>(schema: &'a ModelSchema, field: &str) -> OrmResult<&'a FieldDescriptor> {
    let descriptor = schema.get_field(field).ok_or_else(|| OrmError::UnknownField {
        model: schema.name().to_string(),
        field: field.to_string(),
    })?;
    if descriptor.kind() != FieldKind::TreeIndex {
        return Err(OrmError::ImproperlyConfigured(format!(
            "{}.{field} is a {} field, not a tree index",
            schema.name(),
            descriptor.kind()
        )));
    }
    Ok(descriptor)
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("models", &self.registry.models().map(ModelSchema::name).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}
