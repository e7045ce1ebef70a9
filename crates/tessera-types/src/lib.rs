//! Foundation types for Tessera.
//!
//! This crate provides the identity, value, and record types shared by every
//! other Tessera crate. It performs no I/O.
//!
//! # Key Types
//!
//! - [`ModelId`] -- Opaque, immutable instance identifier
//! - [`IdGenerator`] -- Pluggable id function ([`UuidIdGenerator`], [`ShortIdGenerator`])
//! - [`Value`] -- A typed field value
//! - [`Location`] -- A geo point (longitude, latitude)
//! - [`Instance`] -- A model record: id, current values, and the last persisted snapshot
//! - [`Namespace`] -- Key layout of a model
//! - [`naming`] -- Namespace helpers (`snake_case`)

pub mod error;
pub mod id;
pub mod instance;
pub mod location;
pub mod namespace;
pub mod naming;
pub mod value;

pub use error::TypeError;
pub use id::{IdGenerator, ModelId, ShortIdGenerator, UuidIdGenerator};
pub use instance::Instance;
pub use location::Location;
pub use namespace::Namespace;
pub use naming::snake_case;
pub use value::Value;
