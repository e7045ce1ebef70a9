//! Hierarchical permissions for Tessera.
//!
//! A permission holder owns a set of grants at `ns:<id>:allow`. Grants are
//! colon-delimited paths, optionally restricted (`org:fleet/view`), and a
//! grant on a path covers every path below it.
//!
//! # Key Types
//!
//! - [`Grant`] -- a parsed `path[/restriction]` and the coverage rule
//! - [`PermissionHolder`] -- allow, check, revoke and list grants
//! - [`scripts`] -- the store scripts performing grant set updates
//!
//! # Design Rules
//!
//! 1. A grant `(p, r)` covers `(q, s)` iff `p` is `q` or an ancestor of `q`,
//!    and `r` is absent or equal to `s`.
//! 2. The stored set is minimal: no grant in it covers another.
//! 3. Read-modify-write of a grant set happens inside one store script.

pub mod error;
pub mod grant;
pub mod holder;
pub mod scripts;

pub use error::{AuthError, AuthResult};
pub use grant::Grant;
pub use holder::PermissionHolder;
pub use scripts::{ensure_scripts, AllowScript, IsAllowedScript, RevokeScript};
