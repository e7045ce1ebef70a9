use tessera_store::{Batch, KvStore};
use tessera_types::{ModelId, Namespace};

use crate::error::{IndexError, IndexResult};

/// Every prefix of a colon-delimited path, shortest first, ending with the
/// path itself: `a:b:c` gives `a`, `a:b`, `a:b:c`.
pub fn path_prefixes(path: &str) -> Vec<&str> {
    path.match_indices(':')
        .map(|(i, _)| &path[..i])
        .chain(std::iter::once(path))
        .collect()
}

/// Hierarchical index of one tree-index field.
///
/// An id with value `p1:..:pn` is a member of the exact set of that value
/// and of the subtree set of each of its prefixes. Exact sets answer
/// ancestor queries, subtree sets answer descendant queries.
#[derive(Clone, Debug)]
pub struct TreeIndex<'a> {
    ns: &'a Namespace,
    field: &'a str,
}

impl<'a> TreeIndex<'a> {
    pub fn new(ns: &'a Namespace, field: &'a str) -> Self {
        Self { ns, field }
    }

    pub fn exact_key(&self, value: &str) -> String {
        self.ns.tree(self.field, value)
    }

    pub fn subtree_key(&self, prefix: &str) -> String {
        self.ns.subtree(self.field, prefix)
    }

    /// Stage the writes for a save moving the field from `old` to `new`.
    pub fn stage_save(
        &self,
        batch: &mut Batch,
        id: &ModelId,
        old: Option<&str>,
        new: Option<&str>,
    ) {
        if old == new {
            return;
        }
        if let Some(old) = old {
            self.stage_delete(batch, id, Some(old));
        }
        if let Some(new) = new {
            batch.sadd(self.exact_key(new), id.as_str());
            for prefix in path_prefixes(new) {
                batch.sadd(self.subtree_key(prefix), id.as_str());
            }
        }
    }

    /// Stage removal of `id` from the sets of its current value.
    pub fn stage_delete(&self, batch: &mut Batch, id: &ModelId, current: Option<&str>) {
        let Some(current) = current else {
            return;
        };
        batch.srem(self.exact_key(current), id.as_str());
        for prefix in path_prefixes(current) {
            batch.srem(self.subtree_key(prefix), id.as_str());
        }
    }

    /// Ids whose value is `query` or an ancestor of it, sorted.
    pub fn tree_match(&self, store: &dyn KvStore, query: &str) -> IndexResult<Vec<ModelId>> {
        let keys: Vec<String> = path_prefixes(query)
            .into_iter()
            .map(|prefix| self.exact_key(prefix))
            .collect();
        let ids = store.sunion(&keys)?;
        self.parse_ids(query, ids)
    }

    /// Ids whose value is `query` or a descendant of it, sorted.
    pub fn tree_descendants(
        &self,
        store: &dyn KvStore,
        query: &str,
    ) -> IndexResult<Vec<ModelId>> {
        let ids = store.smembers(&self.subtree_key(query))?;
        self.parse_ids(query, ids)
    }

    fn parse_ids<I>(&self, query: &str, ids: I) -> IndexResult<Vec<ModelId>>
    where
        I: IntoIterator<Item = String>,
    {
        ids.into_iter()
            .map(|raw| {
                ModelId::new(raw).map_err(|source| IndexError::InvalidId {
                    key: self.exact_key(query),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use tessera_store::InMemoryKvStore;

    use super::*;

    fn id(s: &str) -> ModelId {
        ModelId::new(s).unwrap()
    }

    fn ids(items: &[&str]) -> Vec<ModelId> {
        items.iter().map(|s| id(s)).collect()
    }

    fn save(
        store: &InMemoryKvStore,
        tree: &TreeIndex<'_>,
        who: &str,
        old: Option<&str>,
        new: Option<&str>,
    ) {
        let mut batch = Batch::new();
        tree.stage_save(&mut batch, &id(who), old, new);
        store.execute(batch).unwrap();
    }

    // ------------------------------------------------------------------
    // Prefixes
    // ------------------------------------------------------------------

    #[test]
    fn prefixes_of_path() {
        assert_eq!(path_prefixes("a:b:c"), vec!["a", "a:b", "a:b:c"]);
        assert_eq!(path_prefixes("a"), vec!["a"]);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[test]
    fn ancestors_or_self_sorted_by_id() {
        let store = InMemoryKvStore::new();
        let ns = Namespace::for_model(None, "Unit");
        let tree = TreeIndex::new(&ns, "path");
        save(&store, &tree, "z", None, Some("a"));
        save(&store, &tree, "m", None, Some("a:b"));
        save(&store, &tree, "b", None, Some("a:b:c"));
        save(&store, &tree, "q", None, Some("a:x"));

        assert_eq!(tree.tree_match(&store, "a:b:c").unwrap(), ids(&["b", "m", "z"]));
        assert_eq!(tree.tree_match(&store, "a:b").unwrap(), ids(&["m", "z"]));
        assert!(tree.tree_match(&store, "c").unwrap().is_empty());
    }

    #[test]
    fn descendants_or_self() {
        let store = InMemoryKvStore::new();
        let ns = Namespace::for_model(None, "Unit");
        let tree = TreeIndex::new(&ns, "path");
        save(&store, &tree, "1", None, Some("a"));
        save(&store, &tree, "2", None, Some("a:b"));
        save(&store, &tree, "3", None, Some("a:b:c"));
        save(&store, &tree, "4", None, Some("x"));

        assert_eq!(tree.tree_descendants(&store, "a:b").unwrap(), ids(&["2", "3"]));
        assert_eq!(tree.tree_descendants(&store, "a").unwrap(), ids(&["1", "2", "3"]));
    }

    #[test]
    fn moving_a_value_cleans_old_sets() {
        let store = InMemoryKvStore::new();
        let ns = Namespace::for_model(None, "Unit");
        let tree = TreeIndex::new(&ns, "path");
        save(&store, &tree, "1", None, Some("a:b"));
        save(&store, &tree, "1", Some("a:b"), Some("a:c"));

        assert!(!store.exists(&tree.exact_key("a:b")).unwrap());
        assert!(!store.exists(&tree.subtree_key("a:b")).unwrap());
        assert_eq!(tree.tree_descendants(&store, "a").unwrap(), ids(&["1"]));
        assert_eq!(tree.tree_match(&store, "a:c:d").unwrap(), ids(&["1"]));
    }

    #[test]
    fn delete_leaves_no_entries() {
        let store = InMemoryKvStore::new();
        let ns = Namespace::for_model(None, "Unit");
        let tree = TreeIndex::new(&ns, "path");
        save(&store, &tree, "1", None, Some("a:b:c"));

        let mut batch = Batch::new();
        tree.stage_delete(&mut batch, &id("1"), Some("a:b:c"));
        store.execute(batch).unwrap();
        assert!(store.is_empty());
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    fn arb_path() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-c]", 1..4).prop_map(|segments| segments.join(":"))
    }

    fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
        path == ancestor || path.starts_with(&format!("{ancestor}:"))
    }

    proptest! {
        #[test]
        fn match_and_descendants_agree_with_paths(
            paths in prop::collection::vec(arb_path(), 1..12),
            query in arb_path(),
        ) {
            let store = InMemoryKvStore::new();
            let ns = Namespace::for_model(None, "Unit");
            let tree = TreeIndex::new(&ns, "path");
            let assigned: BTreeMap<String, String> = paths
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("id{i:02}"), p.clone()))
                .collect();
            for (who, path) in &assigned {
                save(&store, &tree, who, None, Some(path));
            }

            let ancestors: Vec<ModelId> = assigned
                .iter()
                .filter(|(_, p)| is_ancestor_or_self(p, &query))
                .map(|(who, _)| id(who))
                .collect();
            prop_assert_eq!(tree.tree_match(&store, &query).unwrap(), ancestors);

            let descendants: Vec<ModelId> = assigned
                .iter()
                .filter(|(_, p)| is_ancestor_or_self(&query, p))
                .map(|(who, _)| id(who))
                .collect();
            prop_assert_eq!(tree.tree_descendants(&store, &query).unwrap(), descendants);
        }
    }
}
