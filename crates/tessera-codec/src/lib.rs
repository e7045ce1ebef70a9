//! Field codec for Tessera.
//!
//! Every attribute of a model is declared by a [`FieldDescriptor`]. The
//! descriptor turns raw JSON input into a typed [`Value`](tessera_types::Value),
//! encodes values for the store and back, and renders them for JSON output.
//!
//! # Key Types
//!
//! - [`FieldDescriptor`] -- kind, flags and checks of one field
//! - [`FieldKind`] -- semantic type; decides the [`Storage`] location
//! - [`BadField`] / [`ValidationErrors`] -- per-field rejections with i18n keys
//! - [`secret`] -- salted BLAKE3 hashing for secret fields
//!
//! # Design Rules
//!
//! 1. Missing means absent, JSON null or a blank string.
//! 2. Defaults apply before the required check; list checks apply after it.
//! 3. Secret values never reach the store in plaintext.
//! 4. A stored value that does not decode is an error, not a silent `None`.

pub mod descriptor;
pub mod encode;
pub mod error;
pub mod kind;
pub mod secret;

pub use descriptor::{FieldDefault, FieldDescriptor};
pub use encode::{text_form, DATETIME_FORMAT};
pub use error::{BadField, CodecError, CodecResult, FieldErrorKind, ValidationErrors};
pub use kind::{FieldKind, Storage};
pub use secret::{check_secret, hash_secret, is_hashed};
