//! Store scripts maintaining grant sets.
//!
//! Grant sets are read and rewritten inside scripts only, so two concurrent
//! `allow` or `revoke` calls never interleave their read and write halves.

use std::sync::Arc;

use tessera_store::{KvStore, Script, ScriptContext, StoreError, StoreResult};

use crate::grant::Grant;

pub const ALLOW: &str = "tessera.allow";
pub const IS_ALLOWED: &str = "tessera.is_allowed";
pub const REVOKE: &str = "tessera.revoke";

/// Register the permission scripts unless already present.
pub fn ensure_scripts(store: &dyn KvStore) -> StoreResult<()> {
    if !store.has_script(ALLOW)? {
        store.register_script(Arc::new(AllowScript))?;
    }
    if !store.has_script(IS_ALLOWED)? {
        store.register_script(Arc::new(IsAllowedScript))?;
    }
    if !store.has_script(REVOKE)? {
        store.register_script(Arc::new(RevokeScript))?;
    }
    Ok(())
}

fn arg<'a>(script: &str, values: &'a [String], index: usize) -> StoreResult<&'a str> {
    values
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| StoreError::script(script, format!("missing argument {index}")))
}

fn parse(script: &str, spec: &str) -> StoreResult<Grant> {
    spec.parse()
        .map_err(|e: crate::error::AuthError| StoreError::script(script, e.to_string()))
}

/// Stored grants, skipping entries that do not parse.
fn grants(ctx: &dyn ScriptContext, key: &str) -> StoreResult<Vec<(String, Grant)>> {
    Ok(ctx
        .smembers(key)?
        .into_iter()
        .filter_map(|raw| raw.parse::<Grant>().ok().map(|g| (raw, g)))
        .collect())
}

/// `KEYS[0]` allow key, `ARGS[0]` spec. Replies whether the set changed.
#[derive(Debug)]
pub struct AllowScript;

impl Script for AllowScript {
    fn name(&self) -> &str {
        ALLOW
    }

    fn run(
        &self,
        ctx: &mut dyn ScriptContext,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<bool> {
        let key = arg(ALLOW, keys, 0)?;
        let new = parse(ALLOW, arg(ALLOW, args, 0)?)?;
        let existing = grants(ctx, key)?;

        if existing.iter().any(|(_, g)| g.covers(&new)) {
            return Ok(false);
        }
        for (raw, grant) in &existing {
            if new.covers(grant) {
                ctx.srem(key, raw)?;
            }
        }
        ctx.sadd(key, &new.to_string())?;
        Ok(true)
    }
}

/// `KEYS[0]` allow key, `ARGS[0]` spec and optionally `ARGS[1]` a tail.
///
/// With a tail, the request is the path restricted to the tail, and a grant
/// `<ancestor>:<tail>` on any ancestor-or-self of the path also allows it.
#[derive(Debug)]
pub struct IsAllowedScript;

impl Script for IsAllowedScript {
    fn name(&self) -> &str {
        IS_ALLOWED
    }

    fn run(
        &self,
        ctx: &mut dyn ScriptContext,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<bool> {
        let key = arg(IS_ALLOWED, keys, 0)?;
        let spec = arg(IS_ALLOWED, args, 0)?;
        let existing = grants(ctx, key)?;

        let Some(tail) = args.get(1) else {
            let request = parse(IS_ALLOWED, spec)?;
            let allowed = existing.iter().any(|(_, g)| g.covers(&request));
            return Ok(allowed);
        };

        let request = Grant::new(spec, Some(tail.clone()))
            .map_err(|e| StoreError::script(IS_ALLOWED, e.to_string()))?;
        if existing.iter().any(|(_, g)| g.covers(&request)) {
            return Ok(true);
        }
        for (i, _) in spec.match_indices(':').chain([(spec.len(), "")]) {
            if ctx.sismember(key, &format!("{}:{tail}", &spec[..i]))? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `KEYS[0]` allow key, `ARGS[0]` spec. Replies whether the grant was present.
#[derive(Debug)]
pub struct RevokeScript;

impl Script for RevokeScript {
    fn name(&self) -> &str {
        REVOKE
    }

    fn run(
        &self,
        ctx: &mut dyn ScriptContext,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<bool> {
        let key = arg(REVOKE, keys, 0)?;
        let grant = parse(REVOKE, arg(REVOKE, args, 0)?)?;
        ctx.srem(key, &grant.to_string())
    }
}
