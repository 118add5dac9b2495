//! Chart-ready reshaping of an [`AggregateSnapshot`].
//!
//! Nothing here changes a total. Values are rounded to the requested number of decimal
//! places and converted to `f64` only at this boundary.

use crate::aggregator::{AggregateSnapshot, AttendanceCount, MonthlySeries};
use crate::config::validate_display_precision;
use crate::error::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesOrder {
    /// Largest value first; ties broken by label.
    Ranking,
    /// Keep the map's own key order.
    AsGiven,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelValue {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonutSlice {
    pub label: String,
    pub count: u32,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedBars {
    pub labels: Vec<String>,
    pub series: Vec<BarSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiCards {
    pub students: u32,
    pub total_paid: f64,
    pub total_dues: f64,
    pub previous_dues: f64,
    pub collected_today: f64,
    pub attendance_rate_today: f64,
    pub salaries_paid: f64,
    pub admissions_this_year: u32,
}

pub fn round_for_display(value: Decimal, precision: u32) -> f64 {
    value
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

/// `part` as a percentage of `whole`; zero when `whole` is zero.
pub fn percent_of(part: Decimal, whole: Decimal, precision: u32) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    let percent = part
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(whole))
        .unwrap_or(Decimal::MAX);
    round_for_display(percent, precision)
}

pub fn label_value_series(
    values: &BTreeMap<String, Decimal>,
    order: SeriesOrder,
    precision: u32,
) -> Vec<LabelValue> {
    let mut pairs: Vec<(&String, Decimal)> = values.iter().map(|(k, v)| (k, *v)).collect();

    if order == SeriesOrder::Ranking {
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    }

    pairs
        .into_iter()
        .map(|(label, value)| LabelValue {
            label: label.clone(),
            value: round_for_display(value, precision),
        })
        .collect()
}

/// Jan..Dec timeline of an amount series.
pub fn monthly_timeline(series: &MonthlySeries<Decimal>, precision: u32) -> Vec<LabelValue> {
    series
        .iter()
        .map(|(month, value)| LabelValue {
            label: month.short_label().to_string(),
            value: round_for_display(*value, precision),
        })
        .collect()
}

pub fn count_timeline(series: &MonthlySeries<u32>) -> Vec<LabelValue> {
    series
        .iter()
        .map(|(month, value)| LabelValue {
            label: month.short_label().to_string(),
            value: f64::from(*value),
        })
        .collect()
}

pub fn class_dues_ranking(snapshot: &AggregateSnapshot, precision: u32) -> Vec<LabelValue> {
    let dues = snapshot
        .classes
        .iter()
        .map(|(name, summary)| (name.clone(), summary.dues))
        .collect();
    label_value_series(&dues, SeriesOrder::Ranking, precision)
}

pub fn class_collections_today(snapshot: &AggregateSnapshot, precision: u32) -> Vec<LabelValue> {
    let collected = snapshot
        .classes
        .iter()
        .map(|(name, summary)| (name.clone(), summary.collected_today))
        .collect();
    label_value_series(&collected, SeriesOrder::Ranking, precision)
}

pub fn class_attendance_today(snapshot: &AggregateSnapshot) -> GroupedBars {
    attendance_bars(
        snapshot
            .classes
            .iter()
            .map(|(name, summary)| (name.clone(), summary.attendance_today)),
    )
}

pub fn attendance_timeline(snapshot: &AggregateSnapshot) -> GroupedBars {
    attendance_bars(
        snapshot
            .attendance_by_month
            .iter()
            .map(|(month, count)| (month.short_label().to_string(), *count)),
    )
}

fn attendance_bars(rows: impl Iterator<Item = (String, AttendanceCount)>) -> GroupedBars {
    let mut labels = Vec::new();
    let mut present = Vec::new();
    let mut absent = Vec::new();

    for (label, count) in rows {
        labels.push(label);
        present.push(f64::from(count.present));
        absent.push(f64::from(count.absent));
    }

    GroupedBars {
        labels,
        series: vec![
            BarSeries {
                name: "Present".to_string(),
                values: present,
            },
            BarSeries {
                name: "Absent".to_string(),
                values: absent,
            },
        ],
    }
}

/// Paid / Partial / Due split for the as-of month.
pub fn fee_status_donut(snapshot: &AggregateSnapshot, precision: u32) -> Vec<DonutSlice> {
    let status = &snapshot.fee_status;
    let whole = Decimal::from(status.paid + status.partial + status.due);

    [
        ("Paid", status.paid),
        ("Partial", status.partial),
        ("Due", status.due),
    ]
    .into_iter()
    .map(|(label, count)| DonutSlice {
        label: label.to_string(),
        count,
        percent: percent_of(Decimal::from(count), whole, precision),
    })
    .collect()
}

pub fn subject_average_ranking(snapshot: &AggregateSnapshot, precision: u32) -> Vec<LabelValue> {
    let averages = snapshot
        .subject_scores
        .iter()
        .map(|(subject, tally)| (subject.clone(), tally.percent()))
        .collect();
    label_value_series(&averages, SeriesOrder::Ranking, precision)
}

pub fn attendance_rate_today(snapshot: &AggregateSnapshot, precision: u32) -> f64 {
    let today = snapshot.attendance_today;
    percent_of(
        Decimal::from(today.present),
        Decimal::from(today.recorded()),
        precision,
    )
}

/// Students owing money, labelled `name (class)`, largest dues first.
pub fn defaulter_ranking(
    snapshot: &AggregateSnapshot,
    limit: usize,
    precision: u32,
) -> Vec<LabelValue> {
    snapshot
        .defaulters
        .iter()
        .take(limit)
        .map(|d| LabelValue {
            label: format!("{} ({})", d.name, d.class),
            value: round_for_display(d.dues, precision),
        })
        .collect()
}

pub fn school_kpis(snapshot: &AggregateSnapshot, precision: u32) -> KpiCards {
    let totals = &snapshot.totals;
    KpiCards {
        students: totals.students,
        total_paid: round_for_display(totals.paid, precision),
        total_dues: round_for_display(totals.dues, precision),
        previous_dues: round_for_display(totals.previous_dues, precision),
        collected_today: round_for_display(totals.collected_today, precision),
        attendance_rate_today: attendance_rate_today(snapshot, precision),
        salaries_paid: round_for_display(snapshot.salaries_paid(), precision),
        admissions_this_year: snapshot.admissions_this_year(),
    }
}

pub const TOP_DEFAULTERS: usize = 10;

/// Every dashboard view in one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    pub kpis: KpiCards,
    pub class_dues: Vec<LabelValue>,
    pub class_collections_today: Vec<LabelValue>,
    pub class_attendance_today: GroupedBars,
    pub fee_status: Vec<DonutSlice>,
    pub collections_by_month: Vec<LabelValue>,
    pub admissions_by_month: Vec<LabelValue>,
    pub attendance_by_month: GroupedBars,
    pub salary_by_month: Vec<LabelValue>,
    pub subject_averages: Vec<LabelValue>,
    pub top_defaulters: Vec<LabelValue>,
}

impl DashboardReport {
    pub fn build(snapshot: &AggregateSnapshot, precision: u32) -> Result<Self> {
        validate_display_precision(precision)?;

        Ok(Self {
            kpis: school_kpis(snapshot, precision),
            class_dues: class_dues_ranking(snapshot, precision),
            class_collections_today: class_collections_today(snapshot, precision),
            class_attendance_today: class_attendance_today(snapshot),
            fee_status: fee_status_donut(snapshot, precision),
            collections_by_month: monthly_timeline(&snapshot.collections_by_month, precision),
            admissions_by_month: count_timeline(&snapshot.admissions_by_month),
            attendance_by_month: attendance_timeline(snapshot),
            salary_by_month: monthly_timeline(&snapshot.salary_by_month, precision),
            subject_averages: subject_average_ranking(snapshot, precision),
            top_defaulters: defaulter_ranking(snapshot, TOP_DEFAULTERS, precision),
        })
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{ClassSummary, ScoreTally, StatusCounts};
    use crate::error::FeeLedgerError;
    use crate::utils::SessionMonth;
    use chrono::NaiveDate;

    fn snapshot() -> AggregateSnapshot {
        let mut snapshot = AggregateSnapshot::empty(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        for (name, dues) in [("Grade 1", 1500), ("Grade 2", 4000), ("Grade 3", 1500)] {
            snapshot.classes.insert(
                name.to_string(),
                ClassSummary {
                    dues: Decimal::from(dues),
                    ..Default::default()
                },
            );
        }
        snapshot.fee_status = StatusCounts {
            paid: 1,
            partial: 1,
            due: 1,
            upcoming: 0,
        };
        snapshot.subject_scores.insert(
            "Maths".to_string(),
            ScoreTally {
                obtained: Decimal::from(2),
                total: Decimal::from(3),
                papers: 1,
            },
        );
        snapshot.subject_scores.insert(
            "English".to_string(),
            ScoreTally {
                obtained: Decimal::from(9),
                total: Decimal::from(10),
                papers: 1,
            },
        );
        *snapshot.collections_by_month.get_mut(SessionMonth::March) = Decimal::new(12345, 2);
        snapshot.attendance_today = AttendanceCount {
            present: 2,
            absent: 1,
        };
        snapshot
    }

    #[test]
    fn test_ranking_sorts_descending_with_label_ties() {
        let ranking = class_dues_ranking(&snapshot(), 2);
        let labels: Vec<&str> = ranking.iter().map(|lv| lv.label.as_str()).collect();
        assert_eq!(labels, vec!["Grade 2", "Grade 1", "Grade 3"]);
        assert_eq!(ranking[0].value, 4000.0);
    }

    #[test]
    fn test_as_given_keeps_key_order() {
        let mut values = BTreeMap::new();
        values.insert("b".to_string(), Decimal::from(1));
        values.insert("a".to_string(), Decimal::from(2));
        let series = label_value_series(&values, SeriesOrder::AsGiven, 0);
        assert_eq!(series[0].label, "a");
        assert_eq!(series[1].label, "b");
    }

    #[test]
    fn test_timeline_is_calendar_ordered() {
        let timeline = monthly_timeline(&snapshot().collections_by_month, 1);
        assert_eq!(timeline.len(), 12);
        assert_eq!(timeline[0].label, "Jan");
        assert_eq!(timeline[11].label, "Dec");
        assert_eq!(timeline[2].value, 123.5);
    }

    #[test]
    fn test_donut_percentages_rounded() {
        let slices = fee_status_donut(&snapshot(), 2);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].percent, 33.33);
        let whole: u32 = slices.iter().map(|s| s.count).sum();
        assert_eq!(whole, 3);
    }

    #[test]
    fn test_subject_averages_rank_by_percent() {
        let ranking = subject_average_ranking(&snapshot(), 0);
        assert_eq!(ranking[0].label, "English");
        assert_eq!(ranking[0].value, 90.0);
        assert_eq!(ranking[1].value, 67.0);
    }

    #[test]
    fn test_attendance_rate_and_empty_day() {
        assert_eq!(attendance_rate_today(&snapshot(), 1), 66.7);
        let empty = AggregateSnapshot::empty(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(attendance_rate_today(&empty, 2), 0.0);
    }

    #[test]
    fn test_report_rejects_bad_precision() {
        let result = DashboardReport::build(&snapshot(), 5);
        assert!(matches!(
            result,
            Err(FeeLedgerError::InvalidDisplayPrecision(5))
        ));
    }

    #[test]
    fn test_report_serializes() {
        let report = DashboardReport::build(&snapshot(), 2).unwrap();
        let json = report.to_json().unwrap();
        assert!(json.contains("class_dues"));
        assert!(json.contains("Grade 2"));
        assert_eq!(report.class_attendance_today.labels.len(), 3);
        assert_eq!(report.attendance_by_month.series.len(), 2);
    }
}
