//! Relation managers and inverse edge maintenance.
//!
//! Every relation write stages both sides into one batch. When an inverse
//! slot is single-valued and already points at another owner, that owner's
//! forward edge to the target is dropped in the same batch.

use std::collections::BTreeSet;

use tessera_query::{QuerySet, ScanSource};
use tessera_store::Batch;
use tessera_types::{Instance, ModelId};

use crate::engine::Engine;
use crate::error::{OrmError, OrmResult};
use crate::schema::{ModelSchema, RelationKind, RelationSpec};

impl Engine {
    /// Manager of the single relation `name` of `owner`.
    pub fn foreign<'e>(
        &'e self,
        owner: &'e Instance,
        name: &str,
    ) -> OrmResult<ForeignRelation<'e>> {
        let (schema, spec) = self.relation_spec(owner, name, "foreign", |k| {
            matches!(k, RelationKind::Foreign)
        })?;
        Ok(ForeignRelation {
            edges: Edges::new(self, schema, spec, owner),
        })
    }

    /// Manager of the unordered relation `name` of `owner`.
    pub fn set_relation<'e>(
        &'e self,
        owner: &'e Instance,
        name: &str,
    ) -> OrmResult<SetRelation<'e>> {
        let (schema, spec) =
            self.relation_spec(owner, name, "set", |k| matches!(k, RelationKind::Set))?;
        Ok(SetRelation {
            edges: Edges::new(self, schema, spec, owner),
        })
    }

    /// Manager of the ordered relation `name` of `owner`.
    pub fn sorted_relation<'e>(
        &'e self,
        owner: &'e Instance,
        name: &str,
    ) -> OrmResult<SortedSetRelation<'e>> {
        let (schema, spec) = self.relation_spec(owner, name, "sorted set", |k| {
            matches!(k, RelationKind::SortedSet { .. })
        })?;
        Ok(SortedSetRelation {
            edges: Edges::new(self, schema, spec, owner),
        })
    }

    fn relation_spec(
        &self,
        owner: &Instance,
        name: &str,
        kind: &'static str,
        accepts: impl Fn(&RelationKind) -> bool,
    ) -> OrmResult<(&ModelSchema, &RelationSpec)> {
        let schema = self.schema(owner.model())?;
        match schema.get_relation(name) {
            Some(spec) if accepts(spec.kind()) => Ok((schema, spec)),
            _ => Err(OrmError::UnknownRelation {
                model: schema.name().to_string(),
                relation: name.to_string(),
                kind,
            }),
        }
    }

    /// Ids related to `id` through `relation`, in relation order.
    pub(crate) fn related_ids(
        &self,
        schema: &ModelSchema,
        relation: &RelationSpec,
        id: &ModelId,
    ) -> OrmResult<Vec<ModelId>> {
        let ns = schema.namespace();
        let raw: Vec<String> = match relation.kind() {
            RelationKind::Foreign => self
                .store()
                .hget(&ns.obj(id), relation.name())?
                .into_iter()
                .collect(),
            RelationKind::Set => self
                .store()
                .smembers(&ns.srel(id, relation.name()))?
                .into_iter()
                .collect(),
            RelationKind::SortedSet { .. } => {
                self.store().zrange(&ns.zrel(id, relation.name()), 0, -1)?
            }
        };
        Ok(raw.into_iter().filter_map(|r| ModelId::new(r).ok()).collect())
    }

    /// Stage the inverse edge `target -> owner` of `owner -> target`.
    pub(crate) fn stage_relate_inverse(
        &self,
        batch: &mut Batch,
        schema: &ModelSchema,
        relation: &RelationSpec,
        owner: &Instance,
        target: &ModelId,
    ) -> OrmResult<()> {
        let Some(inverse) = self.registry().inverse_of(relation)? else {
            return Ok(());
        };
        let target_ns = self.schema(relation.target())?.namespace();
        match inverse.kind() {
            RelationKind::Foreign => {
                let obj = target_ns.obj(target);
                let previous = self.store().hget(&obj, inverse.name())?;
                if let Some(previous) = previous.filter(|p| p != owner.id().as_str()) {
                    if let Ok(previous) = ModelId::new(previous) {
                        tracing::debug!(
                            relation = relation.name(),
                            %target,
                            from = %previous,
                            to = %owner.id(),
                            "moving single-valued inverse"
                        );
                        self.stage_unlink(batch, schema, relation, &previous, target)?;
                    }
                }
                batch.hset(obj, inverse.name(), owner.id().as_str());
            }
            RelationKind::Set => {
                batch.sadd(target_ns.srel(target, inverse.name()), owner.id().as_str());
            }
            RelationKind::SortedSet { sort_key } => {
                let score = rank(schema, owner, sort_key)?;
                batch.zadd(target_ns.zrel(target, inverse.name()), owner.id().as_str(), score);
            }
        }
        Ok(())
    }

    /// Stage removal of the inverse edge `target -> owner`.
    pub(crate) fn stage_unrelate_inverse(
        &self,
        batch: &mut Batch,
        relation: &RelationSpec,
        owner: &ModelId,
        target: &ModelId,
    ) -> OrmResult<()> {
        let Some(inverse) = self.registry().inverse_of(relation)? else {
            return Ok(());
        };
        let target_schema = self.schema(relation.target())?;
        self.stage_unlink(batch, target_schema, inverse, target, owner)
    }

    /// Stage removal of the edge `owner -> target` of `relation` alone.
    ///
    /// A single relation is only cleared while it still points at `target`.
    fn stage_unlink(
        &self,
        batch: &mut Batch,
        schema: &ModelSchema,
        relation: &RelationSpec,
        owner: &ModelId,
        target: &ModelId,
    ) -> OrmResult<()> {
        let ns = schema.namespace();
        match relation.kind() {
            RelationKind::Foreign => {
                let obj = ns.obj(owner);
                if self.store().hget(&obj, relation.name())?.as_deref() == Some(target.as_str()) {
                    batch.hdel(obj, relation.name());
                }
            }
            RelationKind::Set => {
                batch.srem(ns.srel(owner, relation.name()), target.as_str());
            }
            RelationKind::SortedSet { .. } => {
                batch.zrem(ns.zrel(owner, relation.name()), target.as_str());
            }
        }
        Ok(())
    }
}

/// Score of `instance` in a relation ranked by its `field`.
fn rank(schema: &ModelSchema, instance: &Instance, field: &str) -> OrmResult<f64> {
    instance
        .get(field)
        .and_then(|value| value.rank().ok())
        .ok_or_else(|| OrmError::SortValue {
            model: schema.name().to_string(),
            id: instance.id().to_string(),
            field: field.to_string(),
        })
}

/// State shared by the three managers.
struct Edges<'e> {
    engine: &'e Engine,
    schema: &'e ModelSchema,
    spec: &'e RelationSpec,
    owner: &'e Instance,
}

impl<'e> Edges<'e> {
    fn new(
        engine: &'e Engine,
        schema: &'e ModelSchema,
        spec: &'e RelationSpec,
        owner: &'e Instance,
    ) -> Self {
        Self {
            engine,
            schema,
            spec,
            owner,
        }
    }

    fn target_schema(&self) -> OrmResult<&'e ModelSchema> {
        self.engine.schema(self.spec.target())
    }

    fn key(&self) -> String {
        let ns = self.schema.namespace();
        let id = self.owner.id();
        match self.spec.kind() {
            RelationKind::Foreign => ns.obj(id),
            RelationKind::Set => ns.srel(id, self.spec.name()),
            RelationKind::SortedSet { .. } => ns.zrel(id, self.spec.name()),
        }
    }

    fn check_owner(&self) -> OrmResult<()> {
        if self.owner.is_persisted() {
            Ok(())
        } else {
            Err(OrmError::not_found(self.schema.name(), self.owner.id()))
        }
    }

    fn check_target(&self, target: &Instance) -> OrmResult<()> {
        if target.model() == self.spec.target() {
            Ok(())
        } else {
            Err(OrmError::WrongTarget {
                relation: self.spec.name().to_string(),
                expected: self.spec.target().to_string(),
                actual: target.model().to_string(),
            })
        }
    }

    /// A target being linked must be live in this engine's store.
    fn check_live(&self, target: &Instance) -> OrmResult<()> {
        self.check_target(target)?;
        let members = self.target_schema()?.namespace().members();
        if self.engine.store().sismember(&members, target.id().as_str())? {
            Ok(())
        } else {
            Err(OrmError::not_found(target.model(), target.id()))
        }
    }

    fn ids(&self) -> OrmResult<Vec<ModelId>> {
        self.engine.related_ids(self.schema, self.spec, self.owner.id())
    }

    fn all(&self) -> OrmResult<Vec<Instance>> {
        let ids = self.ids()?;
        self.engine.load_all(self.target_schema()?, &ids)
    }

    fn count(&self) -> OrmResult<usize> {
        let store = self.engine.store();
        let count = match self.spec.kind() {
            RelationKind::Foreign => usize::from(store.hexists(&self.key(), self.spec.name())?),
            RelationKind::Set => store.scard(&self.key())?,
            RelationKind::SortedSet { .. } => store.zcard(&self.key())?,
        };
        Ok(count)
    }

    fn contains(&self, target: &Instance) -> OrmResult<bool> {
        if target.model() != self.spec.target() {
            return Ok(false);
        }
        let store = self.engine.store();
        let member = target.id().as_str();
        let found = match self.spec.kind() {
            RelationKind::Foreign => {
                store.hget(&self.key(), self.spec.name())?.as_deref() == Some(member)
            }
            RelationKind::Set => store.sismember(&self.key(), member)?,
            RelationKind::SortedSet { .. } => store.zscore(&self.key(), member)?.is_some(),
        };
        Ok(found)
    }

    /// Stage the forward edge to `target` plus its inverse.
    fn stage_add(&self, batch: &mut Batch, target: &Instance) -> OrmResult<()> {
        let member = target.id().as_str();
        match self.spec.kind() {
            RelationKind::Foreign => batch.hset(self.key(), self.spec.name(), member),
            RelationKind::Set => batch.sadd(self.key(), member),
            RelationKind::SortedSet { sort_key } => {
                let score = rank(self.target_schema()?, target, sort_key)?;
                batch.zadd(self.key(), member, score)
            }
        };
        self.engine
            .stage_relate_inverse(batch, self.schema, self.spec, self.owner, target.id())
    }

    /// Stage removal of the forward edge to `target` plus its inverse.
    fn stage_remove(&self, batch: &mut Batch, target: &ModelId) -> OrmResult<()> {
        match self.spec.kind() {
            RelationKind::Foreign => batch.hdel(self.key(), self.spec.name()),
            RelationKind::Set => batch.srem(self.key(), target.as_str()),
            RelationKind::SortedSet { .. } => batch.zrem(self.key(), target.as_str()),
        };
        self.engine
            .stage_unrelate_inverse(batch, self.spec, self.owner.id(), target)
    }

    fn add(&self, target: &Instance) -> OrmResult<()> {
        self.check_owner()?;
        self.check_live(target)?;
        let mut batch = Batch::new();
        if self.spec.kind() == &RelationKind::Foreign {
            for previous in self.ids()?.iter().filter(|p| *p != target.id()) {
                self.engine
                    .stage_unrelate_inverse(&mut batch, self.spec, self.owner.id(), previous)?;
            }
        }
        self.stage_add(&mut batch, target)?;
        self.commit(batch, "related")
    }

    fn remove(&self, target: &Instance) -> OrmResult<()> {
        self.check_owner()?;
        self.check_target(target)?;
        if !self.contains(target)? {
            return Ok(());
        }
        let mut batch = Batch::new();
        self.stage_remove(&mut batch, target.id())?;
        self.commit(batch, "unrelated")
    }

    /// Replace the related set with `targets`.
    fn set(&self, targets: &[&Instance]) -> OrmResult<()> {
        self.check_owner()?;
        for target in targets {
            self.check_live(target)?;
        }
        let wanted: BTreeSet<&ModelId> = targets.iter().map(|t| t.id()).collect();

        let mut batch = Batch::new();
        for current in self.ids()? {
            if !wanted.contains(&current) {
                self.engine
                    .stage_unrelate_inverse(&mut batch, self.spec, self.owner.id(), &current)?;
            }
        }
        match self.spec.kind() {
            RelationKind::Foreign => batch.hdel(self.key(), self.spec.name()),
            _ => batch.del(self.key()),
        };
        for target in targets {
            self.stage_add(&mut batch, target)?;
        }
        self.commit(batch, "replaced")
    }

    fn commit(&self, batch: Batch, action: &'static str) -> OrmResult<()> {
        tracing::debug!(
            model = self.schema.name(),
            id = %self.owner.id(),
            relation = self.spec.name(),
            ops = batch.len(),
            "{action}"
        );
        self.engine.store().execute(batch)?;
        Ok(())
    }

    fn query(&self) -> OrmResult<QuerySet<'e>> {
        let source = match self.spec.kind() {
            RelationKind::SortedSet { .. } => ScanSource::sorted_set(self.key()),
            _ => ScanSource::set(self.key()),
        };
        Ok(self.engine.query_over(self.target_schema()?, source))
    }
}

/// A relation holding at most one target, stored on the owner's record.
pub struct ForeignRelation<'e> {
    edges: Edges<'e>,
}

impl<'e> ForeignRelation<'e> {
    pub fn spec(&self) -> &RelationSpec {
        self.edges.spec
    }

    pub fn id(&self) -> OrmResult<Option<ModelId>> {
        Ok(self.edges.ids()?.into_iter().next())
    }

    pub fn get(&self) -> OrmResult<Option<Instance>> {
        Ok(self.edges.all()?.into_iter().next())
    }

    /// Point at `target`, or clear the pointer with `None`.
    pub fn set(&self, target: Option<&Instance>) -> OrmResult<()> {
        match target {
            Some(target) => self.edges.add(target),
            None => self.edges.set(&[]),
        }
    }

    pub fn add(&self, target: &Instance) -> OrmResult<()> {
        self.edges.add(target)
    }

    /// Clear the pointer if it points at `target`.
    pub fn remove(&self, target: &Instance) -> OrmResult<()> {
        self.edges.remove(target)
    }

    pub fn count(&self) -> OrmResult<usize> {
        self.edges.count()
    }

    pub fn contains(&self, target: &Instance) -> OrmResult<bool> {
        self.edges.contains(target)
    }
}

/// An unordered relation, `ns:<id>:srel_<name>`.
pub struct SetRelation<'e> {
    edges: Edges<'e>,
}

impl<'e> SetRelation<'e> {
    pub fn spec(&self) -> &RelationSpec {
        self.edges.spec
    }

    pub fn key(&self) -> String {
        self.edges.key()
    }

    pub fn ids(&self) -> OrmResult<Vec<ModelId>> {
        self.edges.ids()
    }

    /// Related instances, ordered by id.
    pub fn all(&self) -> OrmResult<Vec<Instance>> {
        self.edges.all()
    }

    pub fn add(&self, target: &Instance) -> OrmResult<()> {
        self.edges.add(target)
    }

    pub fn remove(&self, target: &Instance) -> OrmResult<()> {
        self.edges.remove(target)
    }

    pub fn set(&self, targets: &[&Instance]) -> OrmResult<()> {
        self.edges.set(targets)
    }

    pub fn clear(&self) -> OrmResult<()> {
        self.edges.set(&[])
    }

    pub fn count(&self) -> OrmResult<usize> {
        self.edges.count()
    }

    pub fn contains(&self, target: &Instance) -> OrmResult<bool> {
        self.edges.contains(target)
    }

    pub fn query(&self) -> OrmResult<QuerySet<'e>> {
        self.edges.query()
    }
}

/// An ordered relation, `ns:<id>:zrel_<name>`, ranked by a field of the
/// related instances taken when they are added.
pub struct SortedSetRelation<'e> {
    edges: Edges<'e>,
}

impl<'e> SortedSetRelation<'e> {
    pub fn spec(&self) -> &RelationSpec {
        self.edges.spec
    }

    pub fn key(&self) -> String {
        self.edges.key()
    }

    pub fn ids(&self) -> OrmResult<Vec<ModelId>> {
        self.edges.ids()
    }

    /// Related instances in rank order.
    pub fn all(&self) -> OrmResult<Vec<Instance>> {
        self.edges.all()
    }

    pub fn add(&self, target: &Instance) -> OrmResult<()> {
        self.edges.add(target)
    }

    pub fn remove(&self, target: &Instance) -> OrmResult<()> {
        self.edges.remove(target)
    }

    pub fn set(&self, targets: &[&Instance]) -> OrmResult<()> {
        self.edges.set(targets)
    }

    pub fn clear(&self) -> OrmResult<()> {
        self.edges.set(&[])
    }

    pub fn count(&self) -> OrmResult<usize> {
        self.edges.count()
    }

    pub fn contains(&self, target: &Instance) -> OrmResult<bool> {
        self.edges.contains(target)
    }

    pub fn query(&self) -> OrmResult<QuerySet<'e>> {
        self.edges.query()
    }

    /// Related instances scored within `[min, max]`, in rank order.
    pub fn range_by_score(&self, min: f64, max: f64) -> OrmResult<Vec<Instance>> {
        let ids: Vec<ModelId> = self
            .edges
            .engine
            .store()
            .zrange_by_score(&self.key(), min, max)?
            .into_iter()
            .filter_map(|raw| ModelId::new(raw).ok())
            .collect();
        self.edges.engine.load_all(self.edges.target_schema()?, &ids)
    }
}
