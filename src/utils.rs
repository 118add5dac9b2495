use crate::error::{FeeLedgerError, Result};
use chrono::{DateTime, Datelike, NaiveDate};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the twelve named months of a fee session, in calendar order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum SessionMonth {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

pub const MONTHS: [SessionMonth; 12] = [
    SessionMonth::January,
    SessionMonth::February,
    SessionMonth::March,
    SessionMonth::April,
    SessionMonth::May,
    SessionMonth::June,
    SessionMonth::July,
    SessionMonth::August,
    SessionMonth::September,
    SessionMonth::October,
    SessionMonth::November,
    SessionMonth::December,
];

impl SessionMonth {
    /// Returns the month for a 0-based calendar index (January = 0).
    pub fn from_index(index: usize) -> Result<Self> {
        MONTHS
            .get(index)
            .copied()
            .ok_or(FeeLedgerError::InvalidMonthIndex(index))
    }

    pub fn of(date: NaiveDate) -> Self {
        MONTHS[date.month0() as usize]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionMonth::January => "January",
            SessionMonth::February => "February",
            SessionMonth::March => "March",
            SessionMonth::April => "April",
            SessionMonth::May => "May",
            SessionMonth::June => "June",
            SessionMonth::July => "July",
            SessionMonth::August => "August",
            SessionMonth::September => "September",
            SessionMonth::October => "October",
            SessionMonth::November => "November",
            SessionMonth::December => "December",
        }
    }

    /// Three-letter label used on chart axes.
    pub fn short_label(self) -> &'static str {
        &self.name()[..3]
    }
}

impl fmt::Display for SessionMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Largest single figure (fee, payment, salary, mark) the engine accepts.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Fractional digits kept on every accepted figure.
pub const AMOUNT_SCALE: u32 = 6;

/// Accepts a non-negative amount no larger than [`MAX_AMOUNT`], rounded to [`AMOUNT_SCALE`].
///
/// Keeping every summand this small leaves sums exact for any realistic cohort, so totals
/// cannot overflow and do not depend on summation order.
pub fn checked_amount(amount: Decimal) -> Option<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    if amount > Decimal::from(MAX_AMOUNT) {
        return None;
    }
    Some(amount.round_dp(AMOUNT_SCALE).abs())
}

/// Clamps a stored figure into `0..=MAX_AMOUNT`, rounded to [`AMOUNT_SCALE`].
pub fn clamp_amount(amount: Decimal) -> Decimal {
    amount
        .clamp(Decimal::ZERO, Decimal::from(MAX_AMOUNT))
        .round_dp(AMOUNT_SCALE)
}

/// Parses the date half of an `amount=d=date` payment segment.
///
/// Accepts `YYYY-MM-DD`, a full ISO-8601 timestamp (the date part is kept), and the
/// day-first `DD/MM/YYYY` / `DD-MM-YYYY` forms seen in hand-entered records.
pub fn parse_payment_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.date_naive());
    }

    // Timestamps without an offset still carry a usable date prefix.
    if raw.len() > 10 && raw.as_bytes()[10] == b'T' {
        if let Ok(date) = NaiveDate::parse_from_str(&raw[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }

    ["%d/%m/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
