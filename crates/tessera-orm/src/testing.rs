//! Shared fixtures for the crate's tests.

use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tessera_codec::FieldDescriptor;
use tessera_store::InMemoryKvStore;
use tessera_types::Instance;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::schema::{ModelSchema, OnDelete, Registry, RelationSpec};

pub(crate) fn registry() -> Registry {
    Registry::builder()
        .model(
            ModelSchema::new("Person")
                .field(FieldDescriptor::text("name"))
                .field(FieldDescriptor::text("email").unique())
                .field(FieldDescriptor::secret("password").optional().private())
                .field(FieldDescriptor::location("home").optional())
                .field(FieldDescriptor::dict("prefs"))
                .field(FieldDescriptor::datetime("joined").optional())
                .field(FieldDescriptor::boolean("active").default_value(true))
                .relation(RelationSpec::set("pets", "Pet").inverse("owner"))
                .notify()
                .permission_holder(),
        )
        .model(
            ModelSchema::new("Pet")
                .field(FieldDescriptor::text("name"))
                .field(FieldDescriptor::integer("age").optional())
                .field(FieldDescriptor::text("kind").optional().allowed(["dog", "cat"]))
                .field(FieldDescriptor::integer("legs").default_value(4).not_fillable())
                .relation(RelationSpec::foreign("owner", "Person").inverse("pets")),
        )
        .model(
            ModelSchema::new("Team")
                .field(FieldDescriptor::text("name"))
                .relation(RelationSpec::sorted_set("players", "Player", "rank").inverse("team")),
        )
        .model(
            ModelSchema::new("Player")
                .field(FieldDescriptor::text("name"))
                .field(FieldDescriptor::integer("rank").optional())
                .relation(RelationSpec::foreign("team", "Team").inverse("players")),
        )
        .model(
            ModelSchema::new("Guard")
                .field(FieldDescriptor::text("name"))
                .relation(RelationSpec::foreign("badge", "Badge").inverse("holder")),
        )
        .model(
            ModelSchema::new("Badge")
                .field(FieldDescriptor::text("code"))
                .relation(RelationSpec::foreign("holder", "Guard").inverse("badge")),
        )
        .model(
            ModelSchema::new("Garden")
                .field(FieldDescriptor::text("name"))
                .relation(
                    RelationSpec::set("plants", "Plant")
                        .inverse("garden")
                        .on_delete(OnDelete::Cascade),
                ),
        )
        .model(
            ModelSchema::new("Plant")
                .field(FieldDescriptor::text("name"))
                .relation(
                    RelationSpec::foreign("garden", "Garden")
                        .inverse("plants")
                        .on_delete(OnDelete::Cascade),
                )
                .relation(RelationSpec::set("tools", "Item").on_delete(OnDelete::Restrict)),
        )
        .model(
            ModelSchema::new("Vault")
                .field(FieldDescriptor::text("name"))
                .relation(RelationSpec::set("items", "Item").on_delete(OnDelete::Restrict)),
        )
        .model(ModelSchema::new("Item").field(FieldDescriptor::text("name")))
        .model(
            ModelSchema::new("Shelf")
                .field(FieldDescriptor::text("name"))
                .relation(RelationSpec::set("stock", "Item").on_delete(OnDelete::Cascade))
                .relation(RelationSpec::set("locked", "Item").on_delete(OnDelete::Restrict)),
        )
        .model(
            ModelSchema::new("Rack")
                .field(FieldDescriptor::text("name"))
                .relation(RelationSpec::set("locked", "Item").on_delete(OnDelete::Restrict))
                .relation(RelationSpec::set("stock", "Item").on_delete(OnDelete::Cascade)),
        )
        .model(
            ModelSchema::new("Category")
                .field(FieldDescriptor::text("name"))
                .field(FieldDescriptor::tree_index("path").optional()),
        )
        .build()
        .expect("fixture registry is consistent")
}

pub(crate) fn zoo() -> Engine {
    zoo_with(EngineConfig::default())
}

pub(crate) fn zoo_with(config: EngineConfig) -> Engine {
    Engine::in_memory(registry(), config).expect("engine starts")
}

/// An engine plus a handle on its store for key-level assertions.
pub(crate) fn zoo_store() -> (Engine, Arc<InMemoryKvStore>) {
    let store = Arc::new(InMemoryKvStore::new());
    let engine = Engine::with_config(store.clone(), registry(), EngineConfig::default())
        .expect("engine starts");
    (engine, store)
}

pub(crate) fn raw(value: Json) -> Map<String, Json> {
    match value {
        Json::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub(crate) fn make(engine: &Engine, model: &str, value: Json) -> Instance {
    engine
        .create(model, &raw(value))
        .unwrap_or_else(|e| panic!("create {model}: {e}"))
}
