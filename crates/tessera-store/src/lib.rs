//! Key-value store abstraction for Tessera.
//!
//! Tessera keeps every model, index and relation in a store offering the
//! data structures of a Redis-like server. This crate defines that contract
//! and ships an in-memory implementation.
//!
//! # Primitives
//!
//! - hashes, sets, sorted sets and geo indexes, addressed by string keys
//! - [`Batch`] -- a list of writes applied atomically by [`KvStore::execute`]
//! - [`Script`] -- a routine run atomically against the keyspace by
//!   [`KvStore::eval`], used for read-modify-write sequences
//! - pub/sub channels ([`KvStore::publish`], [`KvStore::subscribe`])
//!
//! # Storage Backends
//!
//! - [`InMemoryKvStore`] -- `RwLock`-guarded keyspace for tests and embedding
//!
//! # Design Rules
//!
//! 1. A batch is all-or-nothing: when one write fails, none is visible.
//! 2. A script sees no interleaved writes and is rolled back if it fails.
//! 3. Empty collections do not exist: removing the last member deletes the key.
//! 4. Writing to a key holding another data type is an error, never a coercion.

pub mod batch;
pub mod error;
pub mod keyspace;
pub mod memory;
pub mod pubsub;
pub mod script;
pub mod traits;

pub use batch::{Batch, Op};
pub use error::{StoreError, StoreResult};
pub use keyspace::{EntryKind, Keyspace, ScanPage};
pub use memory::InMemoryKvStore;
pub use pubsub::{Message, Subscription};
pub use script::{Script, ScriptContext};
pub use traits::KvStore;
