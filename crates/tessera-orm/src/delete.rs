//! Deletion with relation delete policies.
//!
//! The whole cascade is planned with reads only. Restricted relations are
//! then checked against the finished plan, so a dependent that the cascade
//! removes anyway does not block, whatever order the relations are declared
//! in. A remaining live dependent aborts before anything is written;
//! otherwise every removal and unlink goes out in one batch.

use std::collections::BTreeSet;

use tessera_codec::{FieldKind, Storage};
use tessera_index::{TreeIndex, UniqueIndex};
use tessera_store::Batch;
use tessera_types::{Instance, ModelId};

use crate::engine::Engine;
use crate::error::{OrmError, OrmResult};
use crate::events::ChangeEvent;
use crate::schema::{ModelSchema, OnDelete, RelationKind, RelationSpec};

/// Dependents of a restricted relation, checked once planning is done.
struct Restriction<'e> {
    schema: &'e ModelSchema,
    id: ModelId,
    relation: &'e RelationSpec,
    target: &'e ModelSchema,
    dependents: Vec<ModelId>,
}

#[derive(Default)]
struct DeletePlan<'e> {
    seen: BTreeSet<(String, ModelId)>,
    doomed: Vec<(&'e ModelSchema, Instance)>,
    restrictions: Vec<Restriction<'e>>,
    unlinks: Batch,
}

impl DeletePlan<'_> {
    fn contains(&self, model: &str, id: &ModelId) -> bool {
        self.seen.contains(&(model.to_string(), id.clone()))
    }
}

impl Engine {
    /// Delete `instance` and everything its relations cascade to.
    ///
    /// Fails with [`OrmError::DeleteRestricted`], without writing, when a
    /// restricted relation anywhere in the cascade still has dependents.
    pub fn delete(&self, instance: &Instance) -> OrmResult<()> {
        let schema = self.schema(instance.model())?;
        let root = self
            .load(schema, instance.id())?
            .unwrap_or_else(|| instance.clone());

        let mut plan = DeletePlan::default();
        self.plan_delete(&mut plan, root)?;
        self.check_restrictions(&plan)?;

        let DeletePlan {
            doomed, unlinks, ..
        } = plan;
        let mut batch = unlinks;
        for (schema, victim) in &doomed {
            self.stage_remove(&mut batch, schema, victim)?;
        }

        tracing::debug!(
            model = schema.name(),
            id = %instance.id(),
            deleted = doomed.len(),
            ops = batch.len(),
            "deleting"
        );
        self.store().execute(batch)?;

        for (schema, victim) in &doomed {
            self.notify(schema, ChangeEvent::Delete, victim);
        }
        Ok(())
    }

    fn plan_delete<'e>(&'e self, plan: &mut DeletePlan<'e>, instance: Instance) -> OrmResult<()> {
        let schema = self.schema(instance.model())?;
        if !plan
            .seen
            .insert((schema.name().to_string(), instance.id().clone()))
        {
            return Ok(());
        }

        for relation in schema.relations() {
            let related = self.related_ids(schema, relation, instance.id())?;
            if related.is_empty() {
                continue;
            }
            let target = self.schema(relation.target())?;

            match relation.delete_policy() {
                OnDelete::Restrict => plan.restrictions.push(Restriction {
                    schema,
                    id: instance.id().clone(),
                    relation,
                    target,
                    dependents: related,
                }),
                OnDelete::Cascade => {
                    for id in &related {
                        if let Some(dependent) = self.load(target, id)? {
                            self.plan_delete(plan, dependent)?;
                        }
                    }
                }
                OnDelete::SetNull => {
                    for id in &related {
                        self.stage_unrelate_inverse(
                            &mut plan.unlinks,
                            relation,
                            instance.id(),
                            id,
                        )?;
                    }
                }
            }
        }

        plan.doomed.push((schema, instance));
        Ok(())
    }

    /// Fail if a restricted relation still has a live dependent outside the plan.
    fn check_restrictions(&self, plan: &DeletePlan<'_>) -> OrmResult<()> {
        for r in &plan.restrictions {
            let members = r.target.namespace().members();
            for dependent in &r.dependents {
                if plan.contains(r.target.name(), dependent) {
                    continue;
                }
                if self.store().sismember(&members, dependent.as_str())? {
                    tracing::warn!(
                        model = r.schema.name(),
                        id = %r.id,
                        relation = r.relation.name(),
                        %dependent,
                        "delete restricted"
                    );
                    return Err(OrmError::DeleteRestricted {
                        model: r.schema.name().to_string(),
                        id: r.id.to_string(),
                        relation: r.relation.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Stage removal of the record, membership and every derived entry.
    fn stage_remove(
        &self,
        batch: &mut Batch,
        schema: &ModelSchema,
        instance: &Instance,
    ) -> OrmResult<()> {
        let ns = schema.namespace();
        let id = instance.id();

        for field in schema.fields() {
            let name = field.name();
            let current = if instance.is_persisted() {
                instance.persisted_value(name)
            } else {
                instance.get(name)
            };
            let current = current.map(|v| field.serialize(v)).transpose()?;

            match field.storage() {
                Storage::Geo => {
                    batch.georem(ns.geo(name), id.as_str());
                }
                Storage::DictKey => {
                    batch.del(ns.dict(id, name));
                }
                Storage::Record => {}
            }
            if field.is_unique() {
                UniqueIndex::new(ns, name).stage_delete(batch, current.as_deref());
            }
            if field.kind() == FieldKind::TreeIndex {
                TreeIndex::new(ns, name).stage_delete(batch, id, current.as_deref());
            }
        }

        for relation in schema.relations() {
            match relation.kind() {
                RelationKind::Set => {
                    batch.del(ns.srel(id, relation.name()));
                }
                RelationKind::SortedSet { .. } => {
                    batch.del(ns.zrel(id, relation.name()));
                }
                RelationKind::Foreign => {}
            }
        }

        batch.del(ns.obj(id));
        batch.srem(ns.members(), id.as_str());
        if schema.is_permission_holder() {
            batch.del(ns.allow(id));
        }
        Ok(())
    }
}
