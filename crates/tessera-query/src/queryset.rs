use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use tessera_store::{KvStore, ScanPage};
use tessera_types::{Instance, ModelId, Value};

use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;

/// Default number of members fetched per scan page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Data structure holding the ids to iterate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanKind {
    Set,
    SortedSet,
}

/// The member key a query walks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanSource {
    pub key: String,
    pub kind: ScanKind,
}

impl ScanSource {
    pub fn set(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ScanKind::Set,
        }
    }

    pub fn sorted_set(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ScanKind::SortedSet,
        }
    }

    fn page(
        &self,
        store: &dyn KvStore,
        after: Option<&str>,
        count: usize,
    ) -> QueryResult<ScanPage> {
        let page = match self.kind {
            ScanKind::Set => store.sscan(&self.key, after, count)?,
            ScanKind::SortedSet => store.zscan(&self.key, after, count)?,
        };
        Ok(page)
    }
}

/// Turns a scanned id into an instance; `None` when it no longer exists.
pub type Loader<'a> = Box<dyn Fn(&ModelId) -> QueryResult<Option<Instance>> + 'a>;

/// A lazy, filtered sequence of instances of one model.
///
/// Nothing is read until the query is iterated. Ids are fetched a page at a
/// time, loaded, and yielded when every filter matches. Ids whose instance
/// has vanished since the scan are skipped.
pub struct QuerySet<'a> {
    store: &'a dyn KvStore,
    model: String,
    fields: BTreeSet<String>,
    source: ScanSource,
    page_size: usize,
    loader: Loader<'a>,
    filters: Vec<Filter>,
}

impl<'a> QuerySet<'a> {
    /// A query over `source` for `model`, whose declared fields are `fields`.
    pub fn new<I, S>(
        store: &'a dyn KvStore,
        model: impl Into<String>,
        fields: I,
        source: ScanSource,
        loader: Loader<'a>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            model: model.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            source,
            page_size: DEFAULT_PAGE_SIZE,
            loader,
            filters: Vec::new(),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn source(&self) -> &ScanSource {
        &self.source
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Add a filter such as `("age__gte", 18)`. Filters combine with AND.
    ///
    /// Unknown fields and operators are rejected here, before any scan.
    pub fn filter(mut self, spec: &str, value: impl Into<Value>) -> QueryResult<Self> {
        let filter = Filter::parse(spec, value.into())?;
        if filter.field != "id" && !self.fields.contains(&filter.field) {
            return Err(QueryError::UnknownField {
                model: self.model.clone(),
                field: filter.field,
            });
        }
        self.filters.push(filter);
        Ok(self)
    }

    /// Add several filters at once.
    pub fn filter_all<I, S, V>(self, filters: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Value>,
    {
        filters
            .into_iter()
            .try_fold(self, |query, (spec, value)| query.filter(spec.as_ref(), value))
    }

    /// Collect every matching instance.
    pub fn all(self) -> QueryResult<Vec<Instance>> {
        self.into_iter().collect()
    }

    /// The first matching instance.
    pub fn first(self) -> QueryResult<Option<Instance>> {
        self.into_iter().next().transpose()
    }

    /// Number of matching instances.
    pub fn count(self) -> QueryResult<usize> {
        self.into_iter().try_fold(0, |n, item| item.map(|_| n + 1))
    }
}

impl fmt::Debug for QuerySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &self.model)
            .field("source", &self.source)
            .field("filters", &self.filters)
            .finish()
    }
}

impl<'a> IntoIterator for QuerySet<'a> {
    type Item = QueryResult<Instance>;
    type IntoIter = QueryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        QueryIter {
            query: self,
            buffer: VecDeque::new(),
            cursor: None,
            done: false,
        }
    }
}

/// Iterator over a [`QuerySet`]; stops after yielding an error.
pub struct QueryIter<'a> {
    query: QuerySet<'a>,
    buffer: VecDeque<String>,
    cursor: Option<String>,
    done: bool,
}

impl QueryIter<'_> {
    fn fill(&mut self) -> QueryResult<()> {
        let page = self.query.source.page(
            self.query.store,
            self.cursor.as_deref(),
            self.query.page_size,
        )?;
        tracing::trace!(key = %self.query.source.key, fetched = page.members.len(), "scan page");
        self.buffer.extend(page.members);
        match page.next {
            Some(next) => self.cursor = Some(next),
            None => self.done = true,
        }
        Ok(())
    }

    fn step(&mut self) -> QueryResult<Option<Instance>> {
        loop {
            while self.buffer.is_empty() {
                if self.done {
                    return Ok(None);
                }
                self.fill()?;
            }
            let Some(raw) = self.buffer.pop_front() else {
                continue;
            };
            let id = ModelId::new(raw).map_err(|source| QueryError::InvalidId {
                key: self.query.source.key.clone(),
                source,
            })?;
            let Some(instance) = (self.query.loader)(&id)? else {
                tracing::debug!(model = %self.query.model, %id, "skipping vanished instance");
                continue;
            };
            if self.query.filters.iter().all(|f| f.matches(&instance)) {
                return Ok(Some(instance));
            }
        }
    }
}

impl Iterator for QueryIter<'_> {
    type Item = QueryResult<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.buffer.is_empty() {
            return None;
        }
        match self.step() {
            Ok(Some(instance)) => Some(Ok(instance)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                self.buffer.clear();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tessera_store::{Batch, InMemoryKvStore};

    use super::*;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn seed(store: &InMemoryKvStore, pets: &[(&str, &str, i64)]) {
        let mut batch = Batch::new();
        for (id, name, legs) in pets {
            batch.sadd("pet:members", *id);
            batch.hset(format!("pet:{id}:obj"), "name", *name);
            batch.hset(format!("pet:{id}:obj"), "legs", legs.to_string());
        }
        store.execute(batch).unwrap();
    }

    fn loader(store: &InMemoryKvStore) -> Loader<'_> {
        Box::new(move |id: &ModelId| -> QueryResult<Option<Instance>> {
            let hash = store.hgetall(&format!("pet:{id}:obj"))?;
            if hash.is_empty() {
                return Ok(None);
            }
            let mut pet = Instance::new("Pet", id.clone());
            pet.set("name", hash.get("name").cloned().map(Value::Text));
            pet.set(
                "legs",
                hash.get("legs").and_then(|l| l.parse::<i64>().ok()).map(Value::Integer),
            );
            Ok(Some(pet))
        })
    }

    fn pets(store: &InMemoryKvStore) -> QuerySet<'_> {
        QuerySet::new(
            store,
            "Pet",
            ["name", "legs"],
            ScanSource::set("pet:members"),
            loader(store),
        )
        .page_size(2)
    }

    fn ids(instances: Vec<Instance>) -> Vec<String> {
        instances.into_iter().map(|i| i.id().to_string()).collect()
    }

    fn zoo() -> InMemoryKvStore {
        let store = InMemoryKvStore::new();
        seed(
            &store,
            &[
                ("1", "Firulais", 4),
                ("2", "Tweety", 2),
                ("3", "Fido", 4),
                ("4", "Nemo", 0),
                ("5", "Felix", 4),
            ],
        );
        store
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    #[test]
    fn iterates_across_pages() {
        let store = zoo();
        assert_eq!(ids(pets(&store).all().unwrap()), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(pets(&store).count().unwrap(), 5);
    }

    #[test]
    fn empty_source_yields_nothing() {
        let store = InMemoryKvStore::new();
        assert!(pets(&store).first().unwrap().is_none());
    }

    #[test]
    fn vanished_ids_are_skipped() {
        let store = zoo();
        store.del("pet:3:obj").unwrap();
        assert_eq!(ids(pets(&store).all().unwrap()), vec!["1", "2", "4", "5"]);
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    #[test]
    fn filters_apply() {
        let store = zoo();
        let four = pets(&store).filter("legs", 4).unwrap().all().unwrap();
        assert_eq!(ids(four), vec!["1", "3", "5"]);

        let fs = pets(&store)
            .filter("name__startswith", "F")
            .unwrap()
            .filter("legs__gte", 4)
            .unwrap()
            .filter("id__ne", "3")
            .unwrap();
        assert_eq!(ids(fs.all().unwrap()), vec!["1", "5"]);
    }

    #[test]
    fn chained_filters_equal_combined_call() {
        let store = zoo();
        let chained = pets(&store)
            .filter("legs__lt", 4)
            .unwrap()
            .filter("name__endswith", "o")
            .unwrap()
            .all()
            .unwrap();
        let combined = pets(&store)
            .filter_all([("legs__lt", Value::Integer(4)), ("name__endswith", Value::from("o"))])
            .unwrap()
            .all()
            .unwrap();
        assert_eq!(ids(chained.clone()), vec!["4"]);
        assert_eq!(ids(chained), ids(combined));
    }

    #[test]
    fn unknown_field_fails_before_scan() {
        let store = zoo();
        let err = pets(&store).filter("wings__gt", 1).unwrap_err();
        assert_eq!(err.to_string(), "Model Pet does not have field wings");

        let err = pets(&store).filter("legs__foo", 1).unwrap_err();
        assert_eq!(err.to_string(), "Filter foo does not exist");
    }

    #[test]
    fn sorted_set_source() {
        let store = zoo();
        let mut batch = Batch::new();
        batch.zadd("owner:o1:zrel_pets", "3", 1.0).zadd("owner:o1:zrel_pets", "1", 2.0);
        store.execute(batch).unwrap();

        let query = QuerySet::new(
            &store,
            "Pet",
            ["name", "legs"],
            ScanSource::sorted_set("owner:o1:zrel_pets"),
            loader(&store),
        );
        assert_eq!(ids(query.all().unwrap()), vec!["1", "3"]);
    }
}
