use crate::config::validate_shard_count;
use crate::error::{FeeLedgerError, Result};
use crate::fee_schedule::FeeSchedule;
use crate::ledger::{LedgerBuilder, LedgerStatus, StudentLedger};
use crate::schema::{AttendanceRecord, CohortInput, ExamRecord, SalaryRecord, StudentRecord};
use crate::utils::{clamp_amount, SessionMonth, MONTHS};
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

/// Twelve values indexed by calendar month, January first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonthlySeries<T>(pub [T; 12]);

impl<T> MonthlySeries<T> {
    pub fn get(&self, month: SessionMonth) -> &T {
        &self.0[month.index()]
    }

    pub fn get_mut(&mut self, month: SessionMonth) -> &mut T {
        &mut self.0[month.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SessionMonth, &T)> {
        MONTHS.into_iter().zip(self.0.iter())
    }
}

impl<T: AddAssign + Copy> MonthlySeries<T> {
    fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += *theirs;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendanceCount {
    pub present: u32,
    pub absent: u32,
}

impl AttendanceCount {
    pub fn of(record: &AttendanceRecord) -> Self {
        Self {
            present: record.present_count(),
            absent: record.absent_count(),
        }
    }

    pub fn recorded(&self) -> u32 {
        self.present + self.absent
    }
}

impl AddAssign for AttendanceCount {
    fn add_assign(&mut self, other: Self) {
        self.present += other.present;
        self.absent += other.absent;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub paid: u32,
    pub partial: u32,
    pub due: u32,
    pub upcoming: u32,
}

impl StatusCounts {
    fn record(&mut self, status: LedgerStatus) {
        match status {
            LedgerStatus::Paid => self.paid += 1,
            LedgerStatus::Partial => self.partial += 1,
            LedgerStatus::Due => self.due += 1,
            LedgerStatus::Upcoming => self.upcoming += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.paid + self.partial + self.due + self.upcoming
    }
}

impl AddAssign for StatusCounts {
    fn add_assign(&mut self, other: Self) {
        self.paid += other.paid;
        self.partial += other.partial;
        self.due += other.due;
        self.upcoming += other.upcoming;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchoolTotals {
    pub students: u32,
    pub paid: Decimal,
    /// Session dues including carried-forward balances.
    pub dues: Decimal,
    /// The carried-forward part of `dues`.
    pub previous_dues: Decimal,
    pub collected_today: Decimal,
}

impl AddAssign for SchoolTotals {
    fn add_assign(&mut self, other: Self) {
        self.students += other.students;
        self.paid += other.paid;
        self.dues += other.dues;
        self.previous_dues += other.previous_dues;
        self.collected_today += other.collected_today;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassSummary {
    pub monthly_fee: Decimal,
    pub students: u32,
    pub paid: Decimal,
    pub dues: Decimal,
    pub collected_today: Decimal,
    pub attendance_today: AttendanceCount,
    pub fee_status: StatusCounts,
}

impl ClassSummary {
    fn merge(&mut self, other: &Self) {
        self.monthly_fee = self.monthly_fee.max(other.monthly_fee);
        self.students += other.students;
        self.paid += other.paid;
        self.dues += other.dues;
        self.collected_today += other.collected_today;
        self.attendance_today += other.attendance_today;
        self.fee_status += other.fee_status;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreTally {
    pub obtained: Decimal,
    pub total: Decimal,
    pub papers: u32,
}

impl ScoreTally {
    /// Exact percentage, or zero when no marks were available.
    pub fn percent(&self) -> Decimal {
        if self.total.is_zero() {
            return Decimal::ZERO;
        }
        self.obtained
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(self.total))
            .unwrap_or(Decimal::MAX)
    }
}

impl AddAssign for ScoreTally {
    fn add_assign(&mut self, other: Self) {
        self.obtained += other.obtained;
        self.total += other.total;
        self.papers += other.papers;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaulter {
    pub name: String,
    pub roll_number: String,
    pub class: String,
    pub dues: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionalSource {
    Attendance,
    Salaries,
    Exams,
}

/// Data-quality problems that were recovered during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub malformed_segments: usize,
    /// Payments counted by amount whose date text could not be read.
    pub unrecognized_payment_dates: usize,
    pub unknown_classes: BTreeSet<String>,
    pub missing_sources: BTreeSet<OptionalSource>,
}

impl DataQualityReport {
    pub fn is_clean(&self) -> bool {
        self.malformed_segments == 0
            && self.unrecognized_payment_dates == 0
            && self.unknown_classes.is_empty()
            && self.missing_sources.is_empty()
    }

    fn merge(&mut self, other: &Self) {
        self.malformed_segments += other.malformed_segments;
        self.unrecognized_payment_dates += other.unrecognized_payment_dates;
        self.unknown_classes
            .extend(other.unknown_classes.iter().cloned());
        self.missing_sources.extend(other.missing_sources.iter().copied());
    }
}

/// Result of one aggregation pass. Rebuilt on every query, never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub as_of: NaiveDate,
    pub totals: SchoolTotals,
    pub classes: BTreeMap<String, ClassSummary>,
    /// Status of every student for the as-of month.
    pub fee_status: StatusCounts,
    pub admissions_by_month: MonthlySeries<u32>,
    pub collections_by_month: MonthlySeries<Decimal>,
    pub attendance_by_month: MonthlySeries<AttendanceCount>,
    pub attendance_by_day: BTreeMap<NaiveDate, AttendanceCount>,
    pub attendance_today: AttendanceCount,
    pub salary_by_month: MonthlySeries<Decimal>,
    pub subject_scores: BTreeMap<String, ScoreTally>,
    /// Students owing money, largest dues first.
    pub defaulters: Vec<Defaulter>,
    pub data_quality: DataQualityReport,
}

impl AggregateSnapshot {
    pub fn empty(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            totals: SchoolTotals::default(),
            classes: BTreeMap::new(),
            fee_status: StatusCounts::default(),
            admissions_by_month: MonthlySeries::default(),
            collections_by_month: MonthlySeries::default(),
            attendance_by_month: MonthlySeries::default(),
            attendance_by_day: BTreeMap::new(),
            attendance_today: AttendanceCount::default(),
            salary_by_month: MonthlySeries::default(),
            subject_scores: BTreeMap::new(),
            defaulters: Vec::new(),
            data_quality: DataQualityReport::default(),
        }
    }

    /// Combines two partial snapshots taken at the same date.
    ///
    /// Commutative and associative: every figure is an exact sum and every map is keyed.
    pub fn merge(mut self, other: Self) -> Result<Self> {
        if self.as_of != other.as_of {
            return Err(FeeLedgerError::SnapshotDateMismatch {
                left: self.as_of,
                right: other.as_of,
            });
        }

        self.totals += other.totals;
        for (name, summary) in &other.classes {
            self.classes.entry(name.clone()).or_default().merge(summary);
        }
        self.fee_status += other.fee_status;
        self.admissions_by_month.merge(&other.admissions_by_month);
        self.collections_by_month.merge(&other.collections_by_month);
        self.attendance_by_month.merge(&other.attendance_by_month);
        for (day, count) in other.attendance_by_day {
            *self.attendance_by_day.entry(day).or_default() += count;
        }
        self.attendance_today += other.attendance_today;
        self.salary_by_month.merge(&other.salary_by_month);
        for (subject, tally) in other.subject_scores {
            *self.subject_scores.entry(subject).or_default() += tally;
        }
        self.defaulters.extend(other.defaulters);
        sort_defaulters(&mut self.defaulters);
        self.data_quality.merge(&other.data_quality);

        Ok(self)
    }

    pub fn salaries_paid(&self) -> Decimal {
        self.salary_by_month.0.iter().copied().sum()
    }

    pub fn admissions_this_year(&self) -> u32 {
        self.admissions_by_month.0.iter().sum()
    }
}

fn sort_defaulters(defaulters: &mut [Defaulter]) {
    defaulters.sort_by(|a, b| {
        b.dues
            .cmp(&a.dues)
            .then_with(|| a.class.cmp(&b.class))
            .then_with(|| a.roll_number.cmp(&b.roll_number))
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Folds student ledgers and the optional school-wide sources into an [`AggregateSnapshot`].
pub struct CohortAggregator<'a> {
    input: &'a CohortInput,
    schedule: FeeSchedule,
    builder: LedgerBuilder,
}

impl<'a> CohortAggregator<'a> {
    pub fn new(input: &'a CohortInput, as_of: NaiveDate) -> Self {
        Self {
            input,
            schedule: FeeSchedule::new(&input.classes),
            builder: LedgerBuilder::new(as_of),
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.builder.as_of()
    }

    /// Ledger for every student, in input order.
    pub fn ledgers(&self) -> Vec<StudentLedger> {
        self.input
            .students
            .iter()
            .map(|s| self.builder.build(s, self.schedule.fee_for(&s.class)))
            .collect()
    }

    pub fn aggregate(&self) -> AggregateSnapshot {
        info!(
            "Aggregating {} students as of {}",
            self.input.students.len(),
            self.as_of()
        );

        let mut snapshot = self.fold_students(&self.input.students);
        self.fold_sources(&mut snapshot);
        sort_defaulters(&mut snapshot.defaulters);
        snapshot
    }

    /// Same result as [`Self::aggregate`], with the student list split across `shards` threads.
    pub fn aggregate_parallel(&self, shards: usize) -> Result<AggregateSnapshot> {
        validate_shard_count(shards)?;

        let students = &self.input.students;
        if shards == 1 || students.len() < 2 {
            return Ok(self.aggregate());
        }

        let chunk_size = students.len().div_ceil(shards);
        info!(
            "Aggregating {} students as of {} across {} shards",
            students.len(),
            self.as_of(),
            students.len().div_ceil(chunk_size)
        );

        let partials: Vec<AggregateSnapshot> = std::thread::scope(|scope| {
            let handles: Vec<_> = students
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.fold_students(chunk)))
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });

        let mut sources = self.seeded_snapshot();
        self.fold_sources(&mut sources);

        partials
            .into_iter()
            .try_fold(sources, |acc, partial| acc.merge(partial))
    }

    fn seeded_snapshot(&self) -> AggregateSnapshot {
        let mut snapshot = AggregateSnapshot::empty(self.as_of());
        for class in &self.input.classes {
            snapshot.classes.entry(class.name.clone()).or_default().monthly_fee =
                self.schedule.fee_for(&class.name);
        }
        snapshot
    }

    fn fold_students(&self, students: &[StudentRecord]) -> AggregateSnapshot {
        let mut snapshot = self.seeded_snapshot();

        for student in students {
            let fee = match self.schedule.lookup(&student.class) {
                Some(fee) => fee,
                None => {
                    debug!(
                        "Student '{}' is in unknown class '{}', treating fee as 0",
                        student.name, student.class
                    );
                    snapshot
                        .data_quality
                        .unknown_classes
                        .insert(student.class.clone());
                    Decimal::ZERO
                }
            };

            let ledger = self.builder.build(student, fee);
            absorb_ledger(&mut snapshot, &ledger, student.registration_date);
        }

        snapshot
    }

    fn fold_sources(&self, snapshot: &mut AggregateSnapshot) {
        match &self.input.attendance {
            Some(records) => absorb_attendance(snapshot, records),
            None => mark_missing(snapshot, OptionalSource::Attendance),
        }
        match &self.input.salaries {
            Some(records) => absorb_salaries(snapshot, records),
            None => mark_missing(snapshot, OptionalSource::Salaries),
        }
        match &self.input.exams {
            Some(records) => absorb_exams(snapshot, records),
            None => mark_missing(snapshot, OptionalSource::Exams),
        }
    }
}

fn mark_missing(snapshot: &mut AggregateSnapshot, source: OptionalSource) {
    debug!("{:?} source missing, reporting it as all zero", source);
    snapshot.data_quality.missing_sources.insert(source);
}

fn absorb_ledger(
    snapshot: &mut AggregateSnapshot,
    ledger: &StudentLedger,
    registration_date: Option<NaiveDate>,
) {
    let as_of = snapshot.as_of;
    let collected_today = ledger.collected_on(as_of);
    let status = ledger.current_status();

    snapshot.totals += SchoolTotals {
        students: 1,
        paid: ledger.total_paid_this_session,
        dues: ledger.total_dues_this_session,
        previous_dues: ledger.previous_dues,
        collected_today,
    };
    snapshot.fee_status.record(status);

    let class = snapshot.classes.entry(ledger.class.clone()).or_default();
    class.monthly_fee = ledger.monthly_fee;
    class.students += 1;
    class.paid += ledger.total_paid_this_session;
    class.dues += ledger.total_dues_this_session;
    class.collected_today += collected_today;
    class.fee_status.record(status);

    for event in &ledger.events {
        if let Some(date) = event.date.filter(|d| d.year() == as_of.year()) {
            *snapshot.collections_by_month.get_mut(SessionMonth::of(date)) += event.amount;
        }
    }

    if let Some(registered) = registration_date.filter(|d| d.year() == as_of.year()) {
        *snapshot.admissions_by_month.get_mut(SessionMonth::of(registered)) += 1;
    }

    if ledger.has_dues() {
        snapshot.defaulters.push(Defaulter {
            name: ledger.name.clone(),
            roll_number: ledger.roll_number.clone(),
            class: ledger.class.clone(),
            dues: ledger.total_dues_this_session,
        });
    }

    snapshot.data_quality.malformed_segments += ledger.dropped_segments;
    snapshot.data_quality.unrecognized_payment_dates += ledger.unrecognized_dates;
}

fn absorb_attendance(snapshot: &mut AggregateSnapshot, records: &[AttendanceRecord]) {
    let as_of = snapshot.as_of;
    debug!("Folding {} attendance records", records.len());

    for record in records.iter().filter(|r| r.date.year() == as_of.year()) {
        let count = AttendanceCount::of(record);
        *snapshot.attendance_by_month.get_mut(SessionMonth::of(record.date)) += count;
        *snapshot.attendance_by_day.entry(record.date).or_default() += count;

        if record.date == as_of {
            snapshot.attendance_today += count;
            snapshot
                .classes
                .entry(record.class.clone())
                .or_default()
                .attendance_today += count;
        }
    }
}

fn absorb_salaries(snapshot: &mut AggregateSnapshot, records: &[SalaryRecord]) {
    let year = snapshot.as_of.year();
    debug!("Folding {} salary records", records.len());

    for record in records.iter().filter(|r| r.date.year() == year) {
        *snapshot.salary_by_month.get_mut(SessionMonth::of(record.date)) +=
            clamp_amount(record.amount);
    }
}

fn absorb_exams(snapshot: &mut AggregateSnapshot, records: &[ExamRecord]) {
    debug!("Folding {} exam records", records.len());

    for record in records {
        *snapshot
            .subject_scores
            .entry(record.subject.clone())
            .or_default() += ScoreTally {
            obtained: clamp_amount(record.obtained),
            total: clamp_amount(record.total),
            papers: 1,
        };
    }
}

pub fn aggregate(input: &CohortInput, as_of: NaiveDate) -> AggregateSnapshot {
    CohortAggregator::new(input, as_of).aggregate()
}

pub fn aggregate_parallel(
    input: &CohortInput,
    as_of: NaiveDate,
    shards: usize,
) -> Result<AggregateSnapshot> {
    CohortAggregator::new(input, as_of).aggregate_parallel(shards)
}
