//! Decoding of the per-month payment field stored on student records.
//!
//! Three historical shapes share the same string column:
//!
//! - nothing at all (empty, absent or the literal `undefined`)
//! - the literal `Dues`, a manual "unpaid" declaration
//! - a legacy `YYYY-MM-DDTHH:MM:SS.mmmZ` stamp meaning "paid in full" with no amount stored
//! - one or more `amount=d=date` records joined by `;`
//!
//! [`classify`] decides the shape once and returns a [`MonthField`]; everything downstream
//! works with that variant instead of re-inspecting strings.

use crate::utils::{checked_amount, parse_payment_date};
use chrono::NaiveDate;
use log::trace;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub const DUES_MARKER: &str = "Dues";
pub const UNDEFINED_MARKER: &str = "undefined";
pub const SEGMENT_SEPARATOR: &str = ";";
pub const DATE_SEPARATOR: &str = "=d=";

static LEGACY_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$")
        .expect("hardcoded regex should be valid")
});

/// Date half of a payment segment. Text that is not a recognised date is kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentDate {
    On(NaiveDate),
    Unrecognized(String),
}

impl PaymentDate {
    pub fn parse(raw: &str) -> Self {
        match parse_payment_date(raw) {
            Some(date) => PaymentDate::On(date),
            None => PaymentDate::Unrecognized(raw.trim().to_string()),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            PaymentDate::On(date) => Some(*date),
            PaymentDate::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for PaymentDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentDate::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            PaymentDate::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

/// One payment from the current `amount=d=date` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePayment {
    pub amount: Decimal,
    pub date: PaymentDate,
}

impl FeePayment {
    pub fn new(amount: Decimal, date: NaiveDate) -> Self {
        Self {
            amount,
            date: PaymentDate::On(date),
        }
    }

    /// A payment whose date text could not be read. The money still counts.
    pub fn with_unrecognized_date(amount: Decimal, raw_date: &str) -> Self {
        Self {
            amount,
            date: PaymentDate::Unrecognized(raw_date.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonthField {
    Empty,
    ExplicitDue,
    LegacyFull { stamp: String },
    Events { payments: Vec<FeePayment> },
}

/// A payment as seen by the ledger. `date` is `None` for the legacy marker and for
/// payments whose date text was not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEvent {
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedField {
    pub events: Vec<FeeEvent>,
    pub explicit_due: bool,
    /// Segments that could not be parsed and were skipped.
    pub dropped_segments: usize,
    /// Payments kept with their amount but no usable date.
    pub unrecognized_dates: usize,
}

impl DecodedField {
    pub fn total(&self) -> Decimal {
        self.events.iter().map(|e| e.amount).sum()
    }

    /// Sum of event amounts dated exactly `day`. Undated events never match.
    pub fn paid_on(&self, day: NaiveDate) -> Decimal {
        self.events
            .iter()
            .filter(|e| e.date == Some(day))
            .map(|e| e.amount)
            .sum()
    }
}

impl MonthField {
    /// Canonical textual form, or `None` when nothing should be stored.
    ///
    /// An event list with no payments encodes as `None`, which reads back as `Empty`;
    /// both mean "no payment recorded".
    pub fn encode(&self) -> Option<String> {
        match self {
            MonthField::Empty => None,
            MonthField::ExplicitDue => Some(DUES_MARKER.to_string()),
            MonthField::LegacyFull { stamp } => Some(stamp.clone()),
            MonthField::Events { payments } if payments.is_empty() => None,
            MonthField::Events { payments } => Some(encode_payments(payments)),
        }
    }

    pub fn to_decoded(&self, legacy_full_amount: Decimal) -> DecodedField {
        match self {
            MonthField::Empty => DecodedField::default(),
            MonthField::ExplicitDue => DecodedField {
                explicit_due: true,
                ..Default::default()
            },
            MonthField::LegacyFull { .. } => DecodedField {
                events: vec![FeeEvent {
                    amount: legacy_full_amount,
                    date: None,
                }],
                ..Default::default()
            },
            MonthField::Events { payments } => DecodedField {
                events: payments
                    .iter()
                    .map(|p| FeeEvent {
                        amount: p.amount,
                        date: p.date.as_date(),
                    })
                    .collect(),
                unrecognized_dates: payments
                    .iter()
                    .filter(|p| p.date.as_date().is_none())
                    .count(),
                ..Default::default()
            },
        }
    }
}

pub fn classify(raw: Option<&str>) -> MonthField {
    classify_counting_drops(raw).0
}

/// Decodes one month's field into payment events.
///
/// Never fails. Segments without a usable amount are dropped and counted in
/// [`DecodedField::dropped_segments`]; a payment whose date text is not recognised keeps
/// its amount and is counted in [`DecodedField::unrecognized_dates`].
pub fn decode(raw: Option<&str>, legacy_full_amount: Decimal) -> DecodedField {
    let (field, dropped_segments) = classify_counting_drops(raw);
    let mut decoded = field.to_decoded(legacy_full_amount);
    decoded.dropped_segments = dropped_segments;
    decoded
}

pub fn encode_payments(payments: &[FeePayment]) -> String {
    payments
        .iter()
        .map(|p| format!("{}{}{}", p.amount.normalize(), DATE_SEPARATOR, p.date))
        .collect::<Vec<_>>()
        .join(SEGMENT_SEPARATOR)
}

fn classify_counting_drops(raw: Option<&str>) -> (MonthField, usize) {
    let raw = match raw.map(str::trim) {
        None => return (MonthField::Empty, 0),
        Some(s) if s.is_empty() || s == UNDEFINED_MARKER => return (MonthField::Empty, 0),
        Some(s) => s,
    };

    if raw == DUES_MARKER {
        return (MonthField::ExplicitDue, 0);
    }

    if LEGACY_STAMP.is_match(raw) {
        return (
            MonthField::LegacyFull {
                stamp: raw.to_string(),
            },
            0,
        );
    }

    let mut payments = Vec::new();
    let mut dropped = 0;

    for segment in raw.split(SEGMENT_SEPARATOR) {
        if segment.trim().is_empty() {
            continue;
        }
        match parse_segment(segment) {
            Some(payment) => {
                if let PaymentDate::Unrecognized(raw) = &payment.date {
                    trace!("Keeping payment with unrecognised date '{}'", raw);
                }
                payments.push(payment);
            }
            None => {
                trace!("Dropping malformed payment segment '{}'", segment);
                dropped += 1;
            }
        }
    }

    (MonthField::Events { payments }, dropped)
}

fn parse_segment(segment: &str) -> Option<FeePayment> {
    let parts: Vec<&str> = segment.split(DATE_SEPARATOR).collect();
    if parts.len() != 2 {
        return None;
    }

    let amount = parse_amount(parts[0])?;
    Some(FeePayment {
        amount,
        date: PaymentDate::parse(parts[1]),
    })
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    let amount = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()?;
    checked_amount(amount)
}
