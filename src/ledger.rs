use crate::codec::{decode, FeeEvent};
use crate::schema::StudentRecord;
use crate::utils::{clamp_amount, SessionMonth, MONTHS};
use chrono::{Datelike, NaiveDate};
use log::trace;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LedgerStatus {
    /// Paid in full (or overpaid) for a past month.
    Paid,
    /// Some money received for a past month, but less than the fee.
    Partial,
    /// Nothing received for a past month, or explicitly declared unpaid.
    Due,
    /// Month after the as-of month; never owes anything.
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthLedgerEntry {
    pub month: SessionMonth,
    pub status: LedgerStatus,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub is_past: bool,
    /// Carried-forward dues plus every month's `amount_due` up to and including this one.
    pub balance_due: Decimal,
}

/// A decoded payment kept on the ledger so callers can bucket money by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub month: SessionMonth,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentLedger {
    pub name: String,
    pub roll_number: String,
    pub class: String,
    pub as_of: NaiveDate,
    pub monthly_fee: Decimal,
    pub previous_dues: Decimal,
    /// Always twelve entries, January first.
    pub entries: Vec<MonthLedgerEntry>,
    pub events: Vec<LedgerEvent>,
    pub total_paid_this_session: Decimal,
    /// Past-month dues plus carried-forward dues.
    pub total_dues_this_session: Decimal,
    pub dropped_segments: usize,
    pub unrecognized_dates: usize,
}

impl StudentLedger {
    pub fn entry(&self, month: SessionMonth) -> &MonthLedgerEntry {
        &self.entries[month.index()]
    }

    /// Status of the month the ledger was observed in.
    pub fn current_status(&self) -> LedgerStatus {
        self.entry(SessionMonth::of(self.as_of)).status
    }

    /// Money received on `day`. Legacy full payments and unreadable dates never count.
    pub fn collected_on(&self, day: NaiveDate) -> Decimal {
        self.events
            .iter()
            .filter(|e| e.date == Some(day))
            .map(|e| e.amount)
            .sum()
    }

    pub fn has_dues(&self) -> bool {
        self.total_dues_this_session > Decimal::ZERO
    }
}

/// Builds twelve-month ledgers for one observation date.
pub struct LedgerBuilder {
    as_of: NaiveDate,
}

impl LedgerBuilder {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn build(&self, student: &StudentRecord, monthly_fee: Decimal) -> StudentLedger {
        let monthly_fee = clamp_amount(monthly_fee);
        let as_of_index = self.as_of.month0() as usize;
        let previous_dues = student.carried_dues();

        let mut entries = Vec::with_capacity(MONTHS.len());
        let mut events = Vec::new();
        let mut total_paid = Decimal::ZERO;
        let mut balance_due = previous_dues;
        let mut dropped_segments = 0;
        let mut unrecognized_dates = 0;

        for month in MONTHS {
            let decoded = decode(student.month_field(month), monthly_fee);
            let amount_paid = decoded.total();
            let is_past = month.index() <= as_of_index;

            let (status, amount_due) = select_status(
                is_past,
                decoded.explicit_due,
                &decoded.events,
                amount_paid,
                monthly_fee,
            );

            total_paid += amount_paid;
            balance_due += amount_due;
            dropped_segments += decoded.dropped_segments;
            unrecognized_dates += decoded.unrecognized_dates;

            events.extend(decoded.events.into_iter().map(|e| LedgerEvent {
                month,
                amount: e.amount,
                date: e.date,
            }));

            entries.push(MonthLedgerEntry {
                month,
                status,
                amount_paid,
                amount_due,
                is_past,
                balance_due,
            });
        }

        trace!(
            "Ledger for '{}' ({}): paid {}, dues {}",
            student.name,
            student.class,
            total_paid,
            balance_due
        );

        StudentLedger {
            name: student.name.clone(),
            roll_number: student.roll_number.clone(),
            class: student.class.clone(),
            as_of: self.as_of,
            monthly_fee,
            previous_dues,
            entries,
            events,
            total_paid_this_session: total_paid,
            total_dues_this_session: balance_due,
            dropped_segments,
            unrecognized_dates,
        }
    }
}

pub fn build(student: &StudentRecord, monthly_fee: Decimal, as_of: NaiveDate) -> StudentLedger {
    LedgerBuilder::new(as_of).build(student, monthly_fee)
}

// Order matters: future months never owe, a free month is always settled, an explicit
// declaration beats stray payments, and a month with no payment record owes the full fee.
fn select_status(
    is_past: bool,
    explicit_due: bool,
    events: &[FeeEvent],
    amount_paid: Decimal,
    fee: Decimal,
) -> (LedgerStatus, Decimal) {
    if !is_past {
        (LedgerStatus::Upcoming, Decimal::ZERO)
    } else if fee.is_zero() {
        (LedgerStatus::Paid, Decimal::ZERO)
    } else if explicit_due || events.is_empty() {
        (LedgerStatus::Due, fee)
    } else if amount_paid >= fee {
        (LedgerStatus::Paid, Decimal::ZERO)
    } else {
        (LedgerStatus::Partial, fee - amount_paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MAX_AMOUNT;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn student_with(fields: &[(SessionMonth, &str)]) -> StudentRecord {
        StudentRecord {
            name: "Test Student".to_string(),
            roll_number: "1".to_string(),
            class: "Grade 3".to_string(),
            months: fields
                .iter()
                .map(|(m, f)| (*m, Some(f.to_string())))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_partial_payment_entry() {
        let student = student_with(&[(SessionMonth::January, "200=d=2024-01-05;150=d=2024-01-20")]);
        let ledger = build(&student, Decimal::from(500), date(2024, 1, 31));

        let jan = ledger.entry(SessionMonth::January);
        assert_eq!(jan.status, LedgerStatus::Partial);
        assert_eq!(jan.amount_paid, Decimal::from(350));
        assert_eq!(jan.amount_due, Decimal::from(150));
        assert!(jan.is_past);
    }

    #[test]
    fn test_malformed_segment_still_counts_valid_money() {
        let student = student_with(&[(SessionMonth::February, "abc;200=d=2024-02-01")]);
        let ledger = build(&student, Decimal::from(500), date(2024, 3, 1));

        let feb = ledger.entry(SessionMonth::February);
        assert_eq!(feb.amount_paid, Decimal::from(200));
        assert_eq!(feb.status, LedgerStatus::Partial);
        assert_eq!(ledger.dropped_segments, 1);
    }

    #[test]
    fn test_due_cutoff_follows_as_of_month() {
        let student = student_with(&[(SessionMonth::June, "Dues")]);
        let fee = Decimal::from(500);

        for month in 5..12 {
            let ledger = build(&student, fee, date(2024, month + 1, 1));
            let june = ledger.entry(SessionMonth::June);
            assert!(june.is_past);
            assert_eq!(june.amount_due, fee);
        }

        for month in 0..5 {
            let ledger = build(&student, fee, date(2024, month + 1, 1));
            let june = ledger.entry(SessionMonth::June);
            assert!(!june.is_past);
            assert_eq!(june.status, LedgerStatus::Upcoming);
            assert_eq!(june.amount_due, Decimal::ZERO);
        }
    }

    #[test]
    fn test_future_payment_counts_as_paid_but_not_as_due() {
        let student = student_with(&[(SessionMonth::December, "500=d=2024-03-02")]);
        let ledger = build(&student, Decimal::from(500), date(2024, 3, 2));

        let dec = ledger.entry(SessionMonth::December);
        assert_eq!(dec.status, LedgerStatus::Upcoming);
        assert_eq!(dec.amount_due, Decimal::ZERO);
        assert_eq!(ledger.total_paid_this_session, Decimal::from(500));
        assert_eq!(ledger.collected_on(date(2024, 3, 2)), Decimal::from(500));
    }

    #[test]
    fn test_legacy_marker_is_paid_in_full() {
        let student = student_with(&[(SessionMonth::January, "2024-01-03T10:11:12.000Z")]);
        let ledger = build(&student, Decimal::from(800), date(2024, 1, 15));

        let jan = ledger.entry(SessionMonth::January);
        assert_eq!(jan.status, LedgerStatus::Paid);
        assert_eq!(jan.amount_paid, Decimal::from(800));
        assert_eq!(ledger.collected_on(date(2024, 1, 3)), Decimal::ZERO);
    }

    #[test]
    fn test_explicit_due_and_overpayment() {
        let student = student_with(&[
            (SessionMonth::January, "Dues"),
            (SessionMonth::February, "600=d=2024-02-10"),
        ]);
        let ledger = build(&student, Decimal::from(500), date(2024, 2, 28));

        assert_eq!(ledger.entry(SessionMonth::January).status, LedgerStatus::Due);
        let feb = ledger.entry(SessionMonth::February);
        assert_eq!(feb.status, LedgerStatus::Paid);
        assert_eq!(feb.amount_due, Decimal::ZERO);
        assert_eq!(ledger.total_paid_this_session, Decimal::from(600));
        assert_eq!(ledger.total_dues_this_session, Decimal::from(500));
    }

    #[test]
    fn test_zero_fee_months_are_paid() {
        let student = student_with(&[
            (SessionMonth::February, "Dues"),
            (SessionMonth::March, "x;y"),
            (SessionMonth::April, "100=d=2024-04-02"),
        ]);
        let ledger = build(&student, Decimal::ZERO, date(2024, 6, 30));

        for entry in ledger.entries.iter().filter(|e| e.is_past) {
            assert_eq!(entry.status, LedgerStatus::Paid, "{}", entry.month);
            assert_eq!(entry.amount_due, Decimal::ZERO);
        }
        assert_eq!(ledger.total_dues_this_session, Decimal::ZERO);
        assert_eq!(ledger.total_paid_this_session, Decimal::from(100));
        assert!(!ledger.has_dues());
    }

    #[test]
    fn test_unrecognized_date_still_pays_the_month() {
        let student = student_with(&[(SessionMonth::January, "500=d=January 5, 2024")]);
        let ledger = build(&student, Decimal::from(500), date(2024, 1, 31));

        let jan = ledger.entry(SessionMonth::January);
        assert_eq!(jan.status, LedgerStatus::Paid);
        assert_eq!(jan.amount_paid, Decimal::from(500));
        assert_eq!(jan.amount_due, Decimal::ZERO);
        assert_eq!(ledger.unrecognized_dates, 1);
        assert_eq!(ledger.dropped_segments, 0);
        assert_eq!(ledger.collected_on(date(2024, 1, 5)), Decimal::ZERO);
    }

    #[test]
    fn test_previous_dues_added_once_and_balance_runs() {
        let mut student = student_with(&[(SessionMonth::January, "1000=d=2024-01-02")]);
        student.previous_dues = Decimal::from(300);
        let ledger = build(&student, Decimal::from(1000), date(2024, 3, 10));

        assert_eq!(ledger.entry(SessionMonth::January).balance_due, Decimal::from(300));
        assert_eq!(ledger.entry(SessionMonth::February).balance_due, Decimal::from(1300));
        assert_eq!(ledger.entry(SessionMonth::March).balance_due, Decimal::from(2300));
        assert_eq!(ledger.entry(SessionMonth::December).balance_due, Decimal::from(2300));
        assert_eq!(ledger.total_dues_this_session, Decimal::from(2300));
        assert_eq!(ledger.entries.len(), 12);
    }

    #[test]
    fn test_oversized_inputs_are_bounded() {
        let mut student = student_with(&[(
            SessionMonth::January,
            "79228162514264337593543950335=d=2024-01-01;1=d=2024-01-02",
        )]);
        student.previous_dues = Decimal::MAX;
        let ledger = build(&student, Decimal::MAX, date(2024, 12, 31));

        assert_eq!(ledger.monthly_fee, Decimal::from(MAX_AMOUNT));
        assert_eq!(ledger.previous_dues, Decimal::from(MAX_AMOUNT));
        assert_eq!(ledger.total_paid_this_session, Decimal::ONE);
        assert_eq!(ledger.dropped_segments, 1);
        assert_eq!(
            ledger.total_dues_this_session,
            Decimal::from(MAX_AMOUNT) * Decimal::from(13) - Decimal::ONE
        );
    }

    #[test]
    fn test_current_status_tracks_as_of_month() {
        let student = student_with(&[(SessionMonth::April, "100=d=2024-04-01")]);
        let ledger = build(&student, Decimal::from(400), date(2024, 4, 20));
        assert_eq!(ledger.current_status(), LedgerStatus::Partial);
        assert!(ledger.has_dues());
    }
}
