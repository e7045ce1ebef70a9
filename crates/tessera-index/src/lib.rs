//! Derived indexes for Tessera.
//!
//! Indexes are never written directly: each operation stages its writes into
//! the same [`Batch`](tessera_store::Batch) as the record write it derives
//! from, so an index and its records change together or not at all.
//!
//! # Key Types
//!
//! - [`UniqueIndex`] -- hash `ns:index_<field>` mapping values to ids
//! - [`TreeIndex`] -- exact and subtree sets over colon-delimited paths
//!
//! # Design Rules
//!
//! 1. A unique index maps a value to at most one id.
//! 2. An instance re-validated with its own value never conflicts.
//! 3. Absent values are never indexed and never conflict.
//! 4. Stale entries are found by comparing against the persisted value.

pub mod error;
pub mod tree;
pub mod unique;

pub use error::{IndexError, IndexResult};
pub use tree::{path_prefixes, TreeIndex};
pub use unique::UniqueIndex;
