use crate::error::{FeeLedgerError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest number of decimal places a projection may keep.
pub const MAX_DISPLAY_PRECISION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    #[serde(default = "default_worker_shards")]
    #[schemars(
        description = "Number of threads the student list is split across during aggregation. 1 runs the fold on the calling thread."
    )]
    pub worker_shards: usize,

    #[serde(default = "default_display_precision")]
    #[schemars(
        description = "Decimal places kept when projecting amounts and percentages for display (0 to 2)."
    )]
    pub display_precision: u32,
}

fn default_worker_shards() -> usize {
    1
}

fn default_display_precision() -> u32 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_shards: default_worker_shards(),
            display_precision: default_display_precision(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_shard_count(self.worker_shards)?;
        validate_display_precision(self.display_precision)?;
        Ok(())
    }

    /// Parses and validates a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = schemars::schema_for!(EngineConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

pub fn validate_shard_count(shards: usize) -> Result<()> {
    if shards == 0 {
        return Err(FeeLedgerError::InvalidShardCount(shards));
    }
    Ok(())
}

pub fn validate_display_precision(precision: u32) -> Result<()> {
    if precision > MAX_DISPLAY_PRECISION {
        return Err(FeeLedgerError::InvalidDisplayPrecision(precision));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.worker_shards, 1);
        assert_eq!(config.display_precision, 2);
    }

    #[test]
    fn test_rejects_zero_shards() {
        let result = EngineConfig::from_json(r#"{"worker_shards": 0}"#);
        assert!(matches!(result, Err(FeeLedgerError::InvalidShardCount(0))));
    }

    #[test]
    fn test_rejects_wide_precision() {
        let result = EngineConfig::from_json(r#"{"display_precision": 3}"#);
        assert!(matches!(
            result,
            Err(FeeLedgerError::InvalidDisplayPrecision(3))
        ));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let result = EngineConfig::from_json("{not json");
        assert!(matches!(result, Err(FeeLedgerError::SerializationError(_))));
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = EngineConfig::schema_as_json().unwrap();
        assert!(schema.contains("worker_shards"));
        assert!(schema.contains("display_precision"));
    }
}
