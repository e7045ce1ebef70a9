//! Lazy filtered queries for Tessera.
//!
//! A [`QuerySet`] walks the ids of a member key (a model's `members` set or
//! a relation set) page by page, loads each instance through a caller
//! supplied loader and yields those matching every [`Filter`].
//!
//! Filters are written `field__op`, the op defaulting to `eq`:
//! `eq`, `ne`, `lt`, `lte`, `gt`, `gte`, `startswith`, `endswith`. For every
//! op but `eq` and `ne` an instance lacking the field never matches.

pub mod error;
pub mod filter;
pub mod queryset;

pub use error::{QueryError, QueryResult};
pub use filter::{Filter, FilterOp};
pub use queryset::{Loader, QueryIter, QuerySet, ScanKind, ScanSource, DEFAULT_PAGE_SIZE};
