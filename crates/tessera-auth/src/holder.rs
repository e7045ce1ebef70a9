use std::collections::BTreeSet;

use tessera_store::KvStore;

use crate::error::AuthResult;
use crate::grant::Grant;
use crate::scripts::{ensure_scripts, ALLOW, IS_ALLOWED, REVOKE};

/// The grant set of one permission holder, stored at its allow key.
///
/// The set is kept minimal: it never holds a grant covered by another.
pub struct PermissionHolder<'a> {
    store: &'a dyn KvStore,
    key: String,
}

impl<'a> PermissionHolder<'a> {
    pub fn new(store: &'a dyn KvStore, allow_key: impl Into<String>) -> Self {
        Self {
            store,
            key: allow_key.into(),
        }
    }

    pub fn allow_key(&self) -> &str {
        &self.key
    }

    /// Grant `path[/restriction]`.
    ///
    /// Returns `false` when an existing grant already covers it. Otherwise
    /// grants made redundant by the new one are dropped.
    pub fn allow(&self, spec: &str) -> AuthResult<bool> {
        spec.parse::<Grant>()?;
        let changed = self.eval(ALLOW, vec![spec.to_string()])?;
        tracing::debug!(key = %self.key, spec, changed, "allow");
        Ok(changed)
    }

    /// Whether some grant covers `path[/restriction]`.
    pub fn is_allowed(&self, spec: &str) -> AuthResult<bool> {
        spec.parse::<Grant>()?;
        self.eval(IS_ALLOWED, vec![spec.to_string()])
    }

    /// Whether `path` restricted to `tail` is allowed, also accepting a grant
    /// `<ancestor>:<tail>` on any ancestor-or-self of `path`.
    pub fn is_allowed_tail(&self, path: &str, tail: &str) -> AuthResult<bool> {
        Grant::new(path, Some(tail.to_string()))?;
        self.eval(IS_ALLOWED, vec![path.to_string(), tail.to_string()])
    }

    /// Remove exactly the grant `spec`; covered requests are not affected.
    pub fn revoke(&self, spec: &str) -> AuthResult<bool> {
        spec.parse::<Grant>()?;
        let removed = self.eval(REVOKE, vec![spec.to_string()])?;
        tracing::debug!(key = %self.key, spec, removed, "revoke");
        Ok(removed)
    }

    /// The grant set as stored.
    pub fn get_perms(&self) -> AuthResult<BTreeSet<String>> {
        Ok(self.store.smembers(&self.key)?)
    }

    fn eval(&self, script: &'static str, args: Vec<String>) -> AuthResult<bool> {
        ensure_scripts(self.store)?;
        Ok(self.store.eval(script, &[self.key.clone()], &args)?)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tessera_store::InMemoryKvStore;

    use super::*;
    use crate::error::AuthError;

    fn perms(holder: &PermissionHolder<'_>) -> Vec<String> {
        holder.get_perms().unwrap().into_iter().collect()
    }

    // ------------------------------------------------------------------
    // allow
    // ------------------------------------------------------------------

    #[test]
    fn allow_adds_grant() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        assert!(user.allow("a:b:c").unwrap());
        assert!(store.sismember("user:u1:allow", "a:b:c").unwrap());
    }

    #[test]
    fn covered_grants_are_ignored() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("a").unwrap();
        assert!(!user.allow("a:b").unwrap());
        assert!(!user.allow("a:b:c").unwrap());
        assert_eq!(perms(&user), vec!["a"]);
    }

    #[test]
    fn broader_grant_replaces_narrower() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("a:b").unwrap();
        user.allow("a:c/view").unwrap();
        user.allow("b").unwrap();
        assert!(user.allow("a").unwrap());
        assert_eq!(perms(&user), vec!["a", "b"]);

        user.allow("foo:var").unwrap();
        user.allow("foo:var:log").unwrap();
        assert_eq!(perms(&user), vec!["a", "b", "foo:var"]);
    }

    #[test]
    fn restricted_grants_coexist() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("a/view").unwrap();
        user.allow("a:b/edit").unwrap();
        assert!(!user.allow("a:c/view").unwrap());
        assert_eq!(perms(&user), vec!["a/view", "a:b/edit"]);
    }

    // ------------------------------------------------------------------
    // is_allowed
    // ------------------------------------------------------------------

    #[test]
    fn inheritance() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("a:b").unwrap();
        assert!(user.is_allowed("a:b").unwrap());
        assert!(user.is_allowed("a:b:c").unwrap());
        assert!(user.is_allowed("a:b:c/view").unwrap());
        assert!(!user.is_allowed("a").unwrap());
        assert!(!user.is_allowed("a:d").unwrap());
    }

    #[test]
    fn restriction_must_match() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("org/view").unwrap();
        assert!(user.is_allowed("org:fleet/view").unwrap());
        assert!(!user.is_allowed("org:fleet").unwrap());
        assert!(!user.is_allowed("org:fleet/edit").unwrap());
    }

    #[test]
    fn tail_checks() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("org:fleet:view").unwrap();
        assert!(!user.is_allowed("org:fleet:somefleet:view").unwrap());
        assert!(user.is_allowed_tail("org:fleet:somefleet", "view").unwrap());
        assert!(!user.is_allowed_tail("org:fleet:somefleet", "edit").unwrap());

        user.allow("org:truck/drive").unwrap();
        assert!(user.is_allowed_tail("org:truck:t1", "drive").unwrap());
        assert!(!user.is_allowed_tail("org:bus", "drive").unwrap());

        user.allow("depot").unwrap();
        assert!(user.is_allowed_tail("depot:d1", "anything").unwrap());
    }

    #[test]
    fn invalid_spec_is_rejected_without_writes() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        assert!(matches!(user.allow("a::b"), Err(AuthError::InvalidSpec(_))));
        assert!(store.is_empty());
    }

    // ------------------------------------------------------------------
    // revoke / get_perms
    // ------------------------------------------------------------------

    #[test]
    fn revoke_removes_literal_grant_only() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("a").unwrap();
        assert!(!user.revoke("a:b").unwrap());
        assert!(user.is_allowed("a:b").unwrap());
        assert!(user.revoke("a").unwrap());
        assert!(!user.is_allowed("a:b").unwrap());
        assert!(perms(&user).is_empty());
    }

    #[test]
    fn revoke_runs_as_a_script() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        user.allow("fleet/drive").unwrap();
        assert!(store.has_script(REVOKE).unwrap());

        let args = ["fleet/drive".to_string()];
        let keys = ["user:u1:allow".to_string()];
        assert!(store.eval(REVOKE, &keys, &args).unwrap());
        assert!(!store.eval(REVOKE, &keys, &args).unwrap());
        assert!(!user.revoke("fleet/drive").unwrap());
        assert!(!user.is_allowed("fleet:t1/drive").unwrap());
    }

    #[test]
    fn revoke_rejects_invalid_specs() {
        let store = InMemoryKvStore::new();
        let user = PermissionHolder::new(&store, "user:u1:allow");
        assert!(matches!(user.revoke("a::b"), Err(AuthError::InvalidSpec(_))));
        assert!(matches!(user.revoke(""), Err(AuthError::InvalidSpec(_))));
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    fn arb_spec() -> impl Strategy<Value = String> {
        (
            prop::collection::vec("[a-c]", 1..4),
            prop::option::of("(view|edit)"),
        )
            .prop_map(|(segments, restriction)| match restriction {
                Some(r) => format!("{}/{r}", segments.join(":")),
                None => segments.join(":"),
            })
    }

    proptest! {
        #[test]
        fn grant_set_stays_minimal(specs in prop::collection::vec(arb_spec(), 1..20)) {
            let store = InMemoryKvStore::new();
            let user = PermissionHolder::new(&store, "user:u1:allow");
            for spec in &specs {
                user.allow(spec).unwrap();
            }

            let grants: Vec<Grant> = user
                .get_perms()
                .unwrap()
                .iter()
                .map(|s| s.parse().unwrap())
                .collect();
            for a in &grants {
                for b in &grants {
                    prop_assert!(a == b || !a.covers(b), "{a} covers {b}");
                }
            }
            for spec in &specs {
                prop_assert!(user.is_allowed(spec).unwrap());
            }
        }
    }
}
