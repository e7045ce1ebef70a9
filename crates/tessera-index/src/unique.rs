use tessera_codec::BadField;
use tessera_store::{Batch, KvStore};
use tessera_types::{ModelId, Namespace};

use crate::error::{IndexError, IndexResult};

/// Unique value index of one field.
#[derive(Clone, Debug)]
pub struct UniqueIndex<'a> {
    ns: &'a Namespace,
    field: &'a str,
}

impl<'a> UniqueIndex<'a> {
    pub fn new(ns: &'a Namespace, field: &'a str) -> Self {
        Self { ns, field }
    }

    pub fn key(&self) -> String {
        self.ns.index(self.field)
    }

    /// Fail with a not-unique field error when `candidate` maps to another id.
    ///
    /// The check is a plain read: a concurrent writer may claim the value
    /// between this check and the batch that indexes it.
    pub fn check_unique(
        &self,
        store: &dyn KvStore,
        id: &ModelId,
        candidate: Option<&str>,
    ) -> IndexResult<()> {
        let Some(candidate) = candidate else {
            return Ok(());
        };
        match store.hget(&self.key(), candidate)? {
            Some(owner) if owner != id.as_str() => {
                tracing::debug!(field = self.field, %id, %owner, "unique value taken");
                Err(IndexError::NotUnique(BadField::not_unique(self.field)))
            }
            _ => Ok(()),
        }
    }

    /// Stage the index writes for a save moving the field from `old` to `new`.
    pub fn stage_save(
        &self,
        batch: &mut Batch,
        id: &ModelId,
        old: Option<&str>,
        new: Option<&str>,
    ) {
        let key = self.key();
        if let Some(old) = old.filter(|old| Some(*old) != new) {
            batch.hdel(&key, old);
        }
        if let Some(new) = new {
            batch.hset(key, new, id.as_str());
        }
    }

    /// Stage removal of the mapping for the current stored value.
    pub fn stage_delete(&self, batch: &mut Batch, current: Option<&str>) {
        if let Some(current) = current {
            batch.hdel(self.key(), current);
        }
    }

    /// Resolve the id holding `value`.
    pub fn lookup(&self, store: &dyn KvStore, value: &str) -> IndexResult<Option<ModelId>> {
        let key = self.key();
        store
            .hget(&key, value)?
            .map(|raw| ModelId::new(raw).map_err(|source| IndexError::InvalidId { key, source }))
            .transpose()
    }
}
