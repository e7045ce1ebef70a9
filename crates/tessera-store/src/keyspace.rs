//! The keyspace: typed entries addressed by string keys.
//!
//! [`Keyspace`] is shared by every in-process backend. Reads borrow it,
//! writes go through [`Keyspace::apply`] or a [`Tx`], which journals the
//! prior state of every key it touches so a failed batch or script can be
//! undone.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tessera_types::Location;

use crate::batch::Op;
use crate::error::{StoreError, StoreResult};

/// The data structure held by a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Hash,
    Set,
    SortedSet,
    Geo,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hash => "hash",
            Self::Set => "set",
            Self::SortedSet => "zset",
            Self::Geo => "geo",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(BTreeMap<String, f64>),
    Geo(BTreeMap<String, Location>),
}

impl Entry {
    fn kind(&self) -> EntryKind {
        match self {
            Self::Hash(_) => EntryKind::Hash,
            Self::Set(_) => EntryKind::Set,
            Self::SortedSet(_) => EntryKind::SortedSet,
            Self::Geo(_) => EntryKind::Geo,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Hash(m) => m.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::SortedSet(z) => z.is_empty(),
            Self::Geo(g) => g.is_empty(),
        }
    }
}

/// One page of a cursor scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Members of this page, in ascending member order.
    pub members: Vec<String>,
    /// Cursor for the next page, `None` once the scan is complete.
    pub next: Option<String>,
}

/// All keys and their entries.
#[derive(Clone, Debug, Default)]
pub struct Keyspace {
    entries: HashMap<String, Entry>,
}

macro_rules! typed {
    ($name:ident, $name_mut:ident, $variant:ident, $ty:ty) => {
        fn $name(&self, key: &str) -> StoreResult<Option<&$ty>> {
            match self.entries.get(key) {
                None => Ok(None),
                Some(Entry::$variant(inner)) => Ok(Some(inner)),
                Some(other) => Err(wrong_type(key, EntryKind::$variant, other.kind())),
            }
        }

        fn $name_mut(&mut self, key: &str) -> StoreResult<&mut $ty> {
            let entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::$variant(Default::default()));
            match entry {
                Entry::$variant(inner) => Ok(inner),
                other => Err(wrong_type(key, EntryKind::$variant, other.kind())),
            }
        }
    };
}

fn wrong_type(key: &str, expected: EntryKind, actual: EntryKind) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        actual,
    }
}

fn scan<'a, I>(members: I, after: Option<&str>, count: usize) -> ScanPage
where
    I: Iterator<Item = &'a String>,
{
    let count = count.max(1);
    let mut iter = members.filter(|m| after.map_or(true, |a| m.as_str() > a));
    let page: Vec<String> = iter.by_ref().take(count).cloned().collect();
    let next = if iter.next().is_some() {
        page.last().cloned()
    } else {
        None
    };
    ScanPage {
        members: page,
        next,
    }
}

fn ranked(zset: &BTreeMap<String, f64>) -> Vec<(&String, f64)> {
    let mut ranked: Vec<(&String, f64)> = zset.iter().map(|(m, s)| (m, *s)).collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    typed!(hash, hash_mut, Hash, BTreeMap<String, String>);
    typed!(set, set_mut, Set, BTreeSet<String>);
    typed!(zset, zset_mut, SortedSet, BTreeMap<String, f64>);
    typed!(geo, geo_mut, Geo, BTreeMap<String, Location>);

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every live key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn kind(&self, key: &str) -> Option<EntryKind> {
        self.entries.get(key).map(Entry::kind)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    // ------------------------------------------------------------------
    // Hashes
    // ------------------------------------------------------------------

    pub fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    pub fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        Ok(self.hash(key)?.cloned().unwrap_or_default())
    }

    pub fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.hash(key)?.is_some_and(|h| h.contains_key(field)))
    }

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------

    pub fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        Ok(self.set(key)?.cloned().unwrap_or_default())
    }

    pub fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.set(key)?.is_some_and(|s| s.contains(member)))
    }

    pub fn scard(&self, key: &str) -> StoreResult<usize> {
        Ok(self.set(key)?.map_or(0, BTreeSet::len))
    }

    pub fn sscan(&self, key: &str, after: Option<&str>, count: usize) -> StoreResult<ScanPage> {
        Ok(match self.set(key)? {
            Some(set) => scan(set.iter(), after, count),
            None => ScanPage::default(),
        })
    }

    pub fn sunion(&self, keys: &[String]) -> StoreResult<BTreeSet<String>> {
        let mut union = BTreeSet::new();
        for key in keys {
            if let Some(set) = self.set(key)? {
                union.extend(set.iter().cloned());
            }
        }
        Ok(union)
    }

    // ------------------------------------------------------------------
    // Sorted sets
    // ------------------------------------------------------------------

    pub fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self.zset(key)?.and_then(|z| z.get(member).copied()))
    }

    pub fn zcard(&self, key: &str) -> StoreResult<usize> {
        Ok(self.zset(key)?.map_or(0, BTreeMap::len))
    }

    /// Members ranked by score between two inclusive rank positions.
    ///
    /// Negative positions count from the highest rank, `-1` being the last.
    pub fn zrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let Some(zset) = self.zset(key)? else {
            return Ok(Vec::new());
        };
        let len = zset.len() as isize;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(ranked(zset)
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(m, _)| m.clone())
            .collect())
    }

    /// Members with `min <= score <= max`, in rank order.
    pub fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        let Some(zset) = self.zset(key)? else {
            return Ok(Vec::new());
        };
        Ok(ranked(zset)
            .into_iter()
            .filter(|(_, s)| *s >= min && *s <= max)
            .map(|(m, _)| m.clone())
            .collect())
    }

    pub fn zscan(&self, key: &str, after: Option<&str>, count: usize) -> StoreResult<ScanPage> {
        Ok(match self.zset(key)? {
            Some(zset) => scan(zset.keys(), after, count),
            None => ScanPage::default(),
        })
    }

    // ------------------------------------------------------------------
    // Geo
    // ------------------------------------------------------------------

    pub fn geopos(&self, key: &str, member: &str) -> StoreResult<Option<Location>> {
        Ok(self.geo(key)?.and_then(|g| g.get(member).copied()))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let inserted = self
            .hash_mut(key)?
            .insert(field.to_string(), value.to_string())
            .is_none();
        Ok(inserted)
    }

    pub fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool> {
        if self.hash(key)?.is_none() {
            return Ok(false);
        }
        let removed = self.hash_mut(key)?.remove(field).is_some();
        self.prune(key);
        Ok(removed)
    }

    /// Add members to a set, returning how many were new.
    pub fn sadd(&mut self, key: &str, members: &[String]) -> StoreResult<usize> {
        let set = self.set_mut(key)?;
        let added = members.iter().filter(|m| set.insert((*m).clone())).count();
        self.prune(key);
        Ok(added)
    }

    /// Remove members from a set, returning how many were present.
    pub fn srem(&mut self, key: &str, members: &[String]) -> StoreResult<usize> {
        if self.set(key)?.is_none() {
            return Ok(0);
        }
        let set = self.set_mut(key)?;
        let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
        self.prune(key);
        Ok(removed)
    }

    /// Add or rescore members of a sorted set, returning how many were new.
    pub fn zadd(&mut self, key: &str, members: &[(String, f64)]) -> StoreResult<usize> {
        if let Some((member, _)) = members.iter().find(|(_, s)| !s.is_finite()) {
            return Err(StoreError::InvalidScore {
                key: key.to_string(),
                member: member.clone(),
            });
        }
        let zset = self.zset_mut(key)?;
        let added = members
            .iter()
            .filter(|(m, s)| zset.insert(m.clone(), *s).is_none())
            .count();
        self.prune(key);
        Ok(added)
    }

    pub fn zrem(&mut self, key: &str, members: &[String]) -> StoreResult<usize> {
        if self.zset(key)?.is_none() {
            return Ok(0);
        }
        let zset = self.zset_mut(key)?;
        let removed = members
            .iter()
            .filter(|m| zset.remove(m.as_str()).is_some())
            .count();
        self.prune(key);
        Ok(removed)
    }

    pub fn geoadd(&mut self, key: &str, member: &str, location: Location) -> StoreResult<bool> {
        Ok(self
            .geo_mut(key)?
            .insert(member.to_string(), location)
            .is_none())
    }

    pub fn georem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        if self.geo(key)?.is_none() {
            return Ok(false);
        }
        let removed = self.geo_mut(key)?.remove(member).is_some();
        self.prune(key);
        Ok(removed)
    }

    pub fn del(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Apply one batch command.
    pub fn apply(&mut self, op: &Op) -> StoreResult<()> {
        match op {
            Op::HSet { key, field, value } => self.hset(key, field, value).map(drop),
            Op::HDel { key, field } => self.hdel(key, field).map(drop),
            Op::SAdd { key, members } => self.sadd(key, members).map(drop),
            Op::SRem { key, members } => self.srem(key, members).map(drop),
            Op::ZAdd { key, members } => self.zadd(key, members).map(drop),
            Op::ZRem { key, members } => self.zrem(key, members).map(drop),
            Op::GeoAdd {
                key,
                member,
                location,
            } => self.geoadd(key, member, *location).map(drop),
            Op::GeoRem { key, member } => self.georem(key, member).map(drop),
            Op::Del { key } => {
                self.del(key);
                Ok(())
            }
        }
    }

    fn prune(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(Entry::is_empty) {
            self.entries.remove(key);
        }
    }
}

/// A journaled write session over a [`Keyspace`].
///
/// The first write to each key records the entry it held; [`Tx::rollback`]
/// restores those entries. Dropping a `Tx` without rolling back keeps the
/// writes.
pub struct Tx<'a> {
    space: &'a mut Keyspace,
    undo: HashMap<String, Option<Entry>>,
}

impl<'a> Tx<'a> {
    pub fn new(space: &'a mut Keyspace) -> Self {
        Self {
            space,
            undo: HashMap::new(),
        }
    }

    pub fn space(&self) -> &Keyspace {
        &*self.space
    }

    /// Journal `key`, then hand out the keyspace for writing.
    pub fn touch(&mut self, key: &str) -> &mut Keyspace {
        if !self.undo.contains_key(key) {
            self.undo
                .insert(key.to_string(), self.space.entries.get(key).cloned());
        }
        &mut *self.space
    }

    pub fn apply(&mut self, op: &Op) -> StoreResult<()> {
        self.touch(op.key()).apply(op)
    }

    /// Number of distinct keys written so far.
    pub fn touched(&self) -> usize {
        self.undo.len()
    }

    /// Restore every touched key to the entry it held before this session.
    pub fn rollback(self) {
        for (key, prior) in self.undo {
            match prior {
                Some(entry) => {
                    self.space.entries.insert(key, entry);
                }
                None => {
                    self.space.entries.remove(&key);
                }
            }
        }
    }
}
