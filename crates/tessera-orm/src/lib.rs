//! Object mapping for Tessera.
//!
//! Models are declared as [`ModelSchema`]s, resolved by a [`Registry`] and
//! served by an [`Engine`] bound to a [`KvStore`](tessera_store::KvStore).
//! Each write stages the record together with its unique index, tree index,
//! geo and dict entries into a single atomic batch.
//!
//! # Key Types
//!
//! - [`Engine`] -- CRUD, lookups, queries, permissions and change events
//! - [`ModelSchema`] / [`RelationSpec`] -- declared fields and relations
//! - [`Registry`] -- checks relation targets, inverses and sort fields
//! - [`ForeignRelation`], [`SetRelation`], [`SortedSetRelation`] -- relation managers
//! - [`EngineConfig`] -- page size, id generator, notifications
//!
//! # Design Rules
//!
//! 1. Forward and inverse relation edges change in the same batch.
//! 2. A delete plans its whole cascade before writing; `restrict` aborts it.
//! 3. Field errors of one operation are returned together.
//! 4. Change events are published after the write commits.

pub mod config;
mod delete;
pub mod engine;
pub mod error;
pub mod events;
mod model;
pub mod relations;
pub mod schema;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, IdGeneratorKind};
pub use engine::Engine;
pub use error::{OrmError, OrmResult};
pub use events::ChangeEvent;
pub use relations::{ForeignRelation, SetRelation, SortedSetRelation};
pub use schema::{ModelSchema, OnDelete, Registry, RegistryBuilder, RelationKind, RelationSpec};

// Re-export the types model code handles directly
pub use tessera_codec::{FieldDescriptor, FieldKind, ValidationErrors};
pub use tessera_query::{Filter, FilterOp, QuerySet};
pub use tessera_types::{Instance, Location, ModelId, Value};
