use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tessera_types::Location;

use crate::batch::Batch;
use crate::error::StoreResult;
use crate::keyspace::ScanPage;
use crate::pubsub::Subscription;
use crate::script::Script;

/// A key-value store offering hashes, sets, sorted sets and geo indexes.
///
/// Reads are individual commands. Writes are grouped into a [`Batch`] and
/// applied atomically by [`execute`](KvStore::execute); the single-write
/// helpers are one-command batches. Read-modify-write sequences that must be
/// isolated from other writers run as registered [`Script`]s.
///
/// Implementations must be `Send + Sync` so a store can be shared across
/// threads behind an `Arc`.
pub trait KvStore: Send + Sync {
    // -- keys --

    fn exists(&self, key: &str) -> StoreResult<bool>;

    // -- hashes --

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Every field of a hash; empty when the key does not exist.
    fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>>;

    fn hexists(&self, key: &str, field: &str) -> StoreResult<bool>;

    // -- sets --

    fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>>;

    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    fn scard(&self, key: &str) -> StoreResult<usize>;

    /// Up to `count` members following the cursor `after`.
    fn sscan(&self, key: &str, after: Option<&str>, count: usize) -> StoreResult<ScanPage>;

    fn sunion(&self, keys: &[String]) -> StoreResult<BTreeSet<String>>;

    // -- sorted sets --

    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    fn zcard(&self, key: &str) -> StoreResult<usize>;

    /// Members by rank, `start` and `stop` inclusive; negatives count from the end.
    fn zrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>>;

    fn zscan(&self, key: &str, after: Option<&str>, count: usize) -> StoreResult<ScanPage>;

    // -- geo --

    fn geopos(&self, key: &str, member: &str) -> StoreResult<Option<Location>>;

    // -- atomic writes --

    /// Apply every command of `batch`, or none of them.
    fn execute(&self, batch: Batch) -> StoreResult<()>;

    // -- scripts --

    /// Register a script under its name, replacing any previous one.
    fn register_script(&self, script: Arc<dyn Script>) -> StoreResult<()>;

    /// Whether a script with this name is registered.
    fn has_script(&self, name: &str) -> StoreResult<bool>;

    /// Run a registered script atomically and return its answer.
    fn eval(&self, name: &str, keys: &[String], args: &[String]) -> StoreResult<bool>;

    // -- pub/sub --

    /// Publish a payload, returning the number of subscribers reached.
    fn publish(&self, channel: &str, payload: &str) -> StoreResult<usize>;

    fn subscribe(&self, channel: &str) -> StoreResult<Subscription>;

    // -- single-command writes --

    fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.hset(key, field, value);
        self.execute(batch)
    }

    fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.hdel(key, field);
        self.execute(batch)
    }

    fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.sadd(key, member);
        self.execute(batch)
    }

    fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.srem(key, member);
        self.execute(batch)
    }

    fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.zadd(key, member, score);
        self.execute(batch)
    }

    fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.zrem(key, member);
        self.execute(batch)
    }

    fn geoadd(&self, key: &str, member: &str, location: Location) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.geoadd(key, member, location);
        self.execute(batch)
    }

    fn georem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.georem(key, member);
        self.execute(batch)
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.del(key);
        self.execute(batch)
    }
}
