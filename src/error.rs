use chrono::NaiveDate;
use thiserror::Error;

/// Contract violations raised by the engine.
///
/// Data-quality problems (malformed month fields, unknown classes, missing optional sources)
/// are never reported through this type; they are recovered and tallied in
/// [`crate::aggregator::DataQualityReport`].
#[derive(Error, Debug)]
pub enum FeeLedgerError {
    #[error("Invalid month index {0}: must be between 0 and 11")]
    InvalidMonthIndex(usize),

    #[error("Invalid display precision {0}: must be between 0 and 2 decimal places")]
    InvalidDisplayPrecision(u32),

    #[error("Invalid shard count {0}: must be at least 1")]
    InvalidShardCount(usize),

    #[error("Cannot merge snapshots observed at different dates: {left} and {right}")]
    SnapshotDateMismatch { left: NaiveDate, right: NaiveDate },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FeeLedgerError>;
