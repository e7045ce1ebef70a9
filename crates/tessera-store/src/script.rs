//! Server-side scripts.
//!
//! A [`Script`] runs with exclusive access to the keyspace. Reads see the
//! writes the script has already made, and a script that returns an error
//! leaves no trace.

use std::collections::BTreeSet;

use crate::error::StoreResult;
use crate::keyspace::Tx;

/// Keyspace access handed to a running script.
pub trait ScriptContext {
    fn exists(&self, key: &str) -> StoreResult<bool>;
    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
    fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<bool>;
    fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool>;
    fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>>;
    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;
    fn scard(&self, key: &str) -> StoreResult<usize>;
    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool>;
    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool>;
    fn del(&mut self, key: &str) -> StoreResult<bool>;
}

/// An atomic routine registered with a store under a name.
pub trait Script: Send + Sync {
    fn name(&self) -> &str;

    /// Run against `ctx` with the given key and argument lists and answer
    /// yes or no.
    fn run(
        &self,
        ctx: &mut dyn ScriptContext,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<bool>;
}

impl ScriptContext for Tx<'_> {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.space().exists(key))
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.space().hget(key, field)
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.touch(key).hset(key, field, value)
    }

    fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool> {
        self.touch(key).hdel(key, field)
    }

    fn smembers(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        self.space().smembers(key)
    }

    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.space().sismember(key, member)
    }

    fn scard(&self, key: &str) -> StoreResult<usize> {
        self.space().scard(key)
    }

    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.touch(key).sadd(key, &[member.to_string()])? == 1)
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.touch(key).srem(key, &[member.to_string()])? == 1)
    }

    fn del(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.touch(key).del(key))
    }
}
