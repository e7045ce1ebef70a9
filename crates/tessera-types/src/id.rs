use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Characters that may not appear in a model id.
///
/// Ids are embedded in colon-delimited keys and in `path/restriction`
/// permission strings.
const FORBIDDEN_CHARS: &[char] = &[':', '/', ' ', '\t', '\n', '\r'];

/// Opaque identifier of a model instance.
///
/// Immutable after creation and unique within its model namespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(String);

impl ModelId {
    /// Validate and wrap an id string.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() || id.contains(FORBIDDEN_CHARS) {
            return Err(TypeError::InvalidId(id));
        }
        Ok(Self(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelId({})", self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModelId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ModelId {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0
    }
}

/// Pluggable id function used when an instance is created without an id.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh, collision-resistant id.
    fn generate(&self) -> ModelId;
}

/// Time-ordered UUIDv7 ids rendered as 32 lowercase hex characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> ModelId {
        ModelId(uuid::Uuid::now_v7().simple().to_string())
    }
}

/// Random hex ids of a fixed length.
#[derive(Clone, Copy, Debug)]
pub struct ShortIdGenerator {
    len: usize,
}

impl ShortIdGenerator {
    /// Create a generator producing ids of `len` hex characters (at least 1).
    pub fn new(len: usize) -> Self {
        Self { len: len.max(1) }
    }

    /// Length of the generated ids.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl IdGenerator for ShortIdGenerator {
    fn generate(&self) -> ModelId {
        let mut bytes = vec![0u8; self.len.div_ceil(2)];
        rand::thread_rng().fill(bytes.as_mut_slice());
        let mut id = hex::encode(bytes);
        id.truncate(self.len);
        ModelId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_delimiters() {
        assert!(ModelId::new("").is_err());
        assert!(ModelId::new("a:b").is_err());
        assert!(ModelId::new("a/b").is_err());
        assert!(ModelId::new("a b").is_err());
        assert!(ModelId::new("abc123").is_ok());
    }

    #[test]
    fn uuid_ids_are_32_hex_chars() {
        let id = UuidIdGenerator.generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn uuid_ids_are_unique() {
        let a = UuidIdGenerator.generate();
        let b = UuidIdGenerator.generate();
        assert_ne!(a, b);
    }

    #[test]
    fn short_ids_have_requested_length() {
        let generator = ShortIdGenerator::new(11);
        let id = generator.generate();
        assert_eq!(id.as_str().len(), 11);
        assert!(ModelId::new(id.as_str()).is_ok());
    }

    #[test]
    fn short_id_length_is_at_least_one() {
        assert_eq!(ShortIdGenerator::new(0).len(), 1);
    }

    #[test]
    fn serde_roundtrip_validates() {
        let id = ModelId::new("abc").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: ModelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ModelId>("\"a:b\"").is_err());
    }
}
