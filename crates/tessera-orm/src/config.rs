use serde::{Deserialize, Serialize};
use tessera_store::InMemoryKvStore;
use tessera_types::{IdGenerator, ShortIdGenerator, UuidIdGenerator};

use crate::error::{OrmError, OrmResult};

/// Id function used for instances created without an id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGeneratorKind {
    /// 32 hex characters of a UUIDv7.
    #[default]
    Uuid,
    /// `short_id_len` random hex characters.
    Short,
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Members fetched per page when iterating a query.
    pub scan_page_size: usize,
    pub id_generator: IdGeneratorKind,
    pub short_id_len: usize,
    /// Master switch for change events of models flagged `notify`.
    pub notify: bool,
    /// Messages buffered per subscriber by the in-memory store.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_page_size: 100,
            id_generator: IdGeneratorKind::Uuid,
            short_id_len: 12,
            notify: true,
            channel_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> OrmResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| OrmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> OrmResult<String> {
        toml::to_string(self).map_err(|e| OrmError::Config(e.to_string()))
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.scan_page_size == 0 {
            return Err(OrmError::Config("scan_page_size must be positive".into()));
        }
        if self.id_generator == IdGeneratorKind::Short && self.short_id_len < 4 {
            return Err(OrmError::Config("short_id_len must be at least 4".into()));
        }
        Ok(())
    }

    pub fn build_id_generator(&self) -> Box<dyn IdGenerator> {
        match self.id_generator {
            IdGeneratorKind::Uuid => Box::new(UuidIdGenerator),
            IdGeneratorKind::Short => Box::new(ShortIdGenerator::new(self.short_id_len)),
        }
    }

    /// An in-memory store sized by this configuration.
    pub fn memory_store(&self) -> InMemoryKvStore {
        InMemoryKvStore::with_channel_capacity(self.channel_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = EngineConfig::default();
        assert_eq!(c.scan_page_size, 100);
        assert_eq!(c.id_generator, IdGeneratorKind::Uuid);
        assert!(c.notify);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c =
            EngineConfig::from_toml_str("id_generator = \"short\"\nshort_id_len = 8\n").unwrap();
        assert_eq!(c.id_generator, IdGeneratorKind::Short);
        assert_eq!(c.build_id_generator().generate().as_str().len(), 8);
        assert_eq!(c.scan_page_size, 100);
    }

    #[test]
    fn toml_roundtrip() {
        let c = EngineConfig {
            notify: false,
            ..EngineConfig::default()
        };
        let parsed = EngineConfig::from_toml_str(&c.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("scan_page_size = 0"),
            Err(OrmError::Config(_))
        ));
        assert!(EngineConfig::from_toml_str("notify = \"yes\"").is_err());
    }
}
