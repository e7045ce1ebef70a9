use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tessera_types::Location;

use crate::batch::Batch;
use crate::error::{StoreError, StoreResult};
use crate::keyspace::{Keyspace, ScanPage, Tx};
use crate::pubsub::{Channels, Subscription};
use crate::script::Script;
use crate::traits::KvStore;

/// Default number of messages a pub/sub channel buffers per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// In-memory key-value store.
///
/// Intended for tests and embedding. The keyspace sits behind a `RwLock`:
/// reads share it, batches and scripts hold it exclusively, so both are
/// atomic with respect to every other command.
pub struct InMemoryKvStore {
    space: RwLock<Keyspace>,
    scripts: RwLock<HashMap<String, Arc<dyn Script>>>,
    channels: Channels,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a store whose pub/sub channels buffer `capacity` messages.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            space: RwLock::new(Keyspace::new()),
            scripts: RwLock::new(HashMap::new()),
            channels: Channels::new(capacity),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.space.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every live key, sorted.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.read()?.keys())
    }

    /// Remove every key. Registered scripts are kept.
    pub fn flush(&self) -> StoreResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Keyspace>> {
        self.space
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Keyspace>> {
        self.space
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryKvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scripts = self.scripts.read().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("InMemoryKvStore")
            .field("keys", &self.len())
            .field("scripts", &scripts)
            .finish()
    }
}

impl KvStore for InMemoryKvStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read()?.exists(key))
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.read()?.hget(key, field)
    }

    fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        self.read()?.hgetall(key)
    }

    fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.read()?.hexists(key, field)
    }

    fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        self.read()?.smembers(key)
    }

    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.read()?.sismember(key, member)
    }

    fn scard(&self, key: &str) -> StoreResult<usize> {
        self.read()?.scard(key)
    }

    fn sscan(&self, key: &str, after: Option<&str>, count: usize) -> StoreResult<ScanPage> {
        self.read()?.sscan(key, after, count)
    }

    fn sunion(&self, keys: &[String]) -> StoreResult<BTreeSet<String>> {
        self.read()?.sunion(keys)
    }

    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        self.read()?.zscore(key, member)
    }

    fn zcard(&self, key: &str) -> StoreResult<usize> {
        self.read()?.zcard(key)
    }

    fn zrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.read()?.zrange(key, start, stop)
    }

    fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        self.read()?.zrange_by_score(key, min, max)
    }

    fn zscan(&self, key: &str, after: Option<&str>, count: usize) -> StoreResult<ScanPage> {
        self.read()?.zscan(key, after, count)
    }

    fn geopos(&self, key: &str, member: &str) -> StoreResult<Option<Location>> {
        self.read()?.geopos(key, member)
    }

    fn execute(&self, batch: Batch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut space = self.write()?;
        let mut tx = Tx::new(&mut space);
        for op in batch.ops() {
            if let Err(e) = tx.apply(op) {
                tracing::debug!(key = op.key(), error = %e, "batch rolled back");
                tx.rollback();
                return Err(e);
            }
        }
        tracing::debug!(ops = batch.len(), keys = tx.touched(), "batch applied");
        Ok(())
    }

    fn register_script(&self, script: Arc<dyn Script>) -> StoreResult<()> {
        let mut scripts = self
            .scripts
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        tracing::debug!(script = script.name(), "script registered");
        scripts.insert(script.name().to_string(), script);
        Ok(())
    }

    fn has_script(&self, name: &str) -> StoreResult<bool> {
        let scripts = self
            .scripts
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(scripts.contains_key(name))
    }

    fn eval(&self, name: &str, keys: &[String], args: &[String]) -> StoreResult<bool> {
        let script = {
            let scripts = self
                .scripts
                .read()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            scripts
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::UnknownScript(name.to_string()))?
        };
        let mut space = self.write()?;
        let mut tx = Tx::new(&mut space);
        match script.run(&mut tx, keys, args) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::debug!(script = name, error = %e, "script rolled back");
                tx.rollback();
                Err(e)
            }
        }
    }

    fn publish(&self, channel: &str, payload: &str) -> StoreResult<usize> {
        self.channels.publish(channel, payload)
    }

    fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        self.channels.subscribe(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::closure::FnScript;

    fn store() -> InMemoryKvStore {
        InMemoryKvStore::new()
    }

    // ------------------------------------------------------------------
    // Basic commands
    // ------------------------------------------------------------------

    #[test]
    fn hash_commands() {
        let s = store();
        s.hset("h", "a", "1").unwrap();
        s.hset("h", "b", "2").unwrap();
        assert_eq!(s.hget("h", "a").unwrap().as_deref(), Some("1"));
        assert!(s.hexists("h", "b").unwrap());
        assert_eq!(s.hgetall("h").unwrap().len(), 2);
        s.hdel("h", "a").unwrap();
        s.hdel("h", "b").unwrap();
        assert!(!s.exists("h").unwrap());
    }

    #[test]
    fn set_commands() {
        let s = store();
        s.sadd("x", "1").unwrap();
        s.sadd("x", "2").unwrap();
        s.sadd("y", "2").unwrap();
        s.sadd("y", "3").unwrap();
        assert_eq!(s.scard("x").unwrap(), 2);
        assert!(s.sismember("x", "1").unwrap());
        let union = s.sunion(&["x".into(), "y".into(), "z".into()]).unwrap();
        assert_eq!(union.len(), 3);
    }

    #[test]
    fn sorted_set_and_geo_commands() {
        let s = store();
        s.zadd("z", "a", 3.0).unwrap();
        s.zadd("z", "b", 1.0).unwrap();
        assert_eq!(s.zrange("z", 0, -1).unwrap(), vec!["b", "a"]);
        assert_eq!(s.zscore("z", "a").unwrap(), Some(3.0));
        assert_eq!(s.zcard("z").unwrap(), 2);

        let here = Location::new(-103.3, 20.6).unwrap();
        s.geoadd("g", "m", here).unwrap();
        assert_eq!(s.geopos("g", "m").unwrap(), Some(here));
        s.georem("g", "m").unwrap();
        assert!(s.geopos("g", "m").unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Atomicity
    // ------------------------------------------------------------------

    #[test]
    fn failing_batch_leaves_no_trace() {
        let s = store();
        s.hset("h", "f", "v").unwrap();

        let mut batch = Batch::new();
        batch.sadd("members", "1").hset("obj", "name", "x").sadd("h", "oops");
        assert!(s.execute(batch).is_err());

        assert!(!s.exists("members").unwrap());
        assert!(!s.exists("obj").unwrap());
        assert_eq!(s.hget("h", "f").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn batch_applies_in_order() {
        let s = store();
        s.sadd("k", "old").unwrap();
        let mut batch = Batch::new();
        batch.del("k").sadd("k", "new");
        s.execute(batch).unwrap();
        assert_eq!(s.smembers("k").unwrap(), BTreeSet::from(["new".to_string()]));
    }

    // ------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------

    #[test]
    fn eval_runs_registered_script() {
        let s = store();
        s.register_script(Arc::new(FnScript::new("add_once", |ctx, keys, args| {
            ctx.sadd(&keys[0], &args[0])
        })))
        .unwrap();
        assert!(s.has_script("add_once").unwrap());

        let keys = ["s".to_string()];
        let args = ["a".to_string()];
        assert!(s.eval("add_once", &keys, &args).unwrap());
        assert!(!s.eval("add_once", &keys, &args).unwrap());
    }

    #[test]
    fn eval_unknown_script_fails() {
        let err = store().eval("nope", &[], &[]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownScript(name) if name == "nope"));
    }

    #[test]
    fn failing_script_is_rolled_back() {
        let s = store();
        s.register_script(Arc::new(FnScript::new("half", |ctx, _, _| {
            ctx.sadd("s", "a")?;
            Err(StoreError::script("half", "stop"))
        })))
        .unwrap();
        assert!(s.eval("half", &[], &[]).is_err());
        assert!(!s.exists("s").unwrap());
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    #[test]
    fn flush_and_debug() {
        let s = store();
        s.sadd("a", "1").unwrap();
        s.hset("b", "f", "v").unwrap();
        assert_eq!(s.keys().unwrap(), vec!["a", "b"]);
        assert!(format!("{s:?}").contains("keys: 2"));
        s.flush().unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn publish_reaches_subscriber() {
        let s = InMemoryKvStore::with_channel_capacity(8);
        let mut sub = s.subscribe("news").unwrap();
        assert_eq!(s.publish("news", "{}").unwrap(), 1);
        assert_eq!(sub.try_recv().unwrap().payload, "{}");
    }
}
