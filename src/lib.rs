//! # Fee Ledger Engine
//!
//! A library for turning the payment fields stored on school student records into
//! per-student monthly ledgers and school-wide dashboard aggregates.
//!
//! ## Core Concepts
//!
//! - **Month fields**: each student carries one encoded string per calendar month. Three
//!   historical encodings coexist and are decoded into a [`MonthField`] once.
//! - **As-of date**: the observation point supplied by the caller. Months up to and including
//!   its month are past and can owe money; later months are upcoming and never do.
//! - **Ledger**: twelve [`MonthLedgerEntry`] values per student with running dues.
//! - **Snapshot**: school totals, class breakdowns and time series built fresh on every query.
//! - **Projection**: chart-ready shapes. Rounding happens there and nowhere else.
//!
//! The engine performs no I/O and never reads the clock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fee_ledger_engine::*;
//! use chrono::NaiveDate;
//! use rust_decimal::Decimal;
//!
//! let input = CohortInput {
//!     students: vec![StudentRecord {
//!         name: "Asha".to_string(),
//!         roll_number: "1".to_string(),
//!         class: "Grade 1".to_string(),
//!         months: [(SessionMonth::January, Some("500=d=2024-01-05".to_string()))]
//!             .into_iter()
//!             .collect(),
//!         ..Default::default()
//!     }],
//!     classes: vec![ClassRecord {
//!         name: "Grade 1".to_string(),
//!         school_fees: Decimal::from(500),
//!     }],
//!     ..Default::default()
//! };
//!
//! let engine = FeeLedgerEngine::new(EngineConfig::default()).unwrap();
//! let as_of = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
//! let report = engine.report(&input, as_of).unwrap();
//! println!("{}", report.to_json().unwrap());
//! ```

pub mod aggregator;
pub mod codec;
pub mod config;
pub mod error;
pub mod fee_schedule;
pub mod ledger;
pub mod projection;
pub mod schema;
pub mod utils;

pub use aggregator::{
    aggregate, aggregate_parallel, AggregateSnapshot, AttendanceCount, ClassSummary,
    CohortAggregator, DataQualityReport, Defaulter, MonthlySeries, OptionalSource, SchoolTotals,
    ScoreTally, StatusCounts,
};
pub use codec::{
    classify, decode, encode_payments, DecodedField, FeeEvent, FeePayment, MonthField, PaymentDate,
};
pub use config::EngineConfig;
pub use error::{FeeLedgerError, Result};
pub use fee_schedule::{resolve, FeeSchedule};
pub use ledger::{LedgerBuilder, LedgerEvent, LedgerStatus, MonthLedgerEntry, StudentLedger};
pub use projection::*;
pub use schema::*;
pub use utils::{SessionMonth, MONTHS};

use chrono::NaiveDate;
use log::{debug, info};

pub struct FeeLedgerEngine {
    config: EngineConfig,
}

impl FeeLedgerEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ledger for a single student, resolving the fee from `classes`.
    pub fn student_ledger(
        &self,
        student: &StudentRecord,
        classes: &[ClassRecord],
        as_of: NaiveDate,
    ) -> StudentLedger {
        let fee = resolve(&student.class, classes);
        ledger::build(student, fee, as_of)
    }

    pub fn aggregate(&self, input: &CohortInput, as_of: NaiveDate) -> Result<AggregateSnapshot> {
        let aggregator = CohortAggregator::new(input, as_of);

        let snapshot = if self.config.worker_shards > 1 {
            aggregator.aggregate_parallel(self.config.worker_shards)?
        } else {
            aggregator.aggregate()
        };

        if !snapshot.data_quality.is_clean() {
            debug!(
                "Recovered data issues: {} malformed segments, {} unreadable payment dates, {} unknown classes, missing sources {:?}",
                snapshot.data_quality.malformed_segments,
                snapshot.data_quality.unrecognized_payment_dates,
                snapshot.data_quality.unknown_classes.len(),
                snapshot.data_quality.missing_sources
            );
        }

        Ok(snapshot)
    }

    pub fn report(&self, input: &CohortInput, as_of: NaiveDate) -> Result<DashboardReport> {
        let snapshot = self.aggregate(input, as_of)?;
        info!(
            "Building dashboard report for {} students as of {}",
            snapshot.totals.students, as_of
        );
        DashboardReport::build(&snapshot, self.config.display_precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn two_student_input() -> CohortInput {
        let paid_months = (0..6)
            .map(|i| {
                (
                    SessionMonth::from_index(i).unwrap(),
                    Some(format!("1000=d=2024-{:02}-01", i + 1)),
                )
            })
            .collect();

        CohortInput {
            students: vec![
                StudentRecord {
                    name: "A".to_string(),
                    roll_number: "1".to_string(),
                    class: "Grade 4".to_string(),
                    months: paid_months,
                    ..Default::default()
                },
                StudentRecord {
                    name: "B".to_string(),
                    roll_number: "2".to_string(),
                    class: "Grade 4".to_string(),
                    previous_dues: Decimal::from(500),
                    ..Default::default()
                },
            ],
            classes: vec![ClassRecord {
                name: "Grade 4".to_string(),
                school_fees: Decimal::from(1000),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_totals() {
        let engine = FeeLedgerEngine::new(EngineConfig::default()).unwrap();
        let snapshot = engine
            .aggregate(&two_student_input(), date(2024, 7, 15))
            .unwrap();

        assert_eq!(snapshot.totals.paid, Decimal::from(6000));
        // A owes July; B owes January..July plus the carried 500.
        assert_eq!(snapshot.totals.dues, Decimal::from(1000 + 500 + 7000));
    }

    #[test]
    fn test_sharded_engine_matches_sequential() {
        let input = two_student_input();
        let as_of = date(2024, 7, 15);

        let sequential = FeeLedgerEngine::new(EngineConfig::default()).unwrap();
        let sharded = FeeLedgerEngine::new(EngineConfig {
            worker_shards: 2,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            sequential.aggregate(&input, as_of).unwrap(),
            sharded.aggregate(&input, as_of).unwrap()
        );
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let result = FeeLedgerEngine::new(EngineConfig {
            worker_shards: 0,
            display_precision: 2,
        });
        assert!(matches!(result, Err(FeeLedgerError::InvalidShardCount(0))));
    }

    #[test]
    fn test_student_ledger_unknown_class() {
        let engine = FeeLedgerEngine::new(EngineConfig::default()).unwrap();
        let student = StudentRecord {
            class: "Unlisted".to_string(),
            ..Default::default()
        };
        let ledger = engine.student_ledger(&student, &[], date(2024, 5, 1));
        assert_eq!(ledger.monthly_fee, Decimal::ZERO);
        assert_eq!(ledger.total_dues_this_session, Decimal::ZERO);
    }

    #[test]
    fn test_report_kpis() {
        let engine = FeeLedgerEngine::new(EngineConfig::default()).unwrap();
        let report = engine
            .report(&two_student_input(), date(2024, 7, 15))
            .unwrap();
        assert_eq!(report.kpis.students, 2);
        assert_eq!(report.kpis.total_dues, 8500.0);
        assert_eq!(report.top_defaulters[0].label, "B (Grade 4)");
    }
}
