use crate::utils::{clamp_amount, SessionMonth};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct StudentRecord {
    #[serde(default)]
    #[schemars(description = "Student display name")]
    pub name: String,

    #[serde(default)]
    #[schemars(description = "Roll number, unique within a class")]
    pub roll_number: String,

    #[serde(default)]
    #[schemars(description = "Class name; joins against ClassRecord.name")]
    pub class: String,

    #[serde(default)]
    #[schemars(description = "Admission date in YYYY-MM-DD format, if recorded")]
    pub registration_date: Option<NaiveDate>,

    #[serde(default)]
    #[schemars(
        description = "Balance carried forward from earlier sessions. Counted once towards session dues."
    )]
    pub previous_dues: Decimal,

    #[serde(default)]
    #[schemars(
        description = "Encoded payment field per month name: empty/'undefined' (open), 'Dues' (declared unpaid), a legacy ISO timestamp (paid in full), or ';'-joined 'amount=d=date' records."
    )]
    pub months: BTreeMap<SessionMonth, Option<String>>,
}

impl StudentRecord {
    /// Raw encoded field for `month`, if any was stored.
    pub fn month_field(&self, month: SessionMonth) -> Option<&str> {
        self.months.get(&month).and_then(|f| f.as_deref())
    }

    /// Carried-forward balance, clamped into the accepted amount range.
    pub fn carried_dues(&self) -> Decimal {
        clamp_amount(self.previous_dues)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ClassRecord {
    #[schemars(description = "Class name")]
    pub name: String,

    #[serde(default)]
    #[schemars(description = "Monthly fee for the class. 0 means no fee configured.")]
    pub school_fees: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct AttendanceRecord {
    pub class: String,

    pub date: NaiveDate,

    #[serde(default)]
    #[schemars(description = "Comma-joined roll numbers of present students")]
    pub present: String,

    #[serde(default)]
    #[schemars(description = "Comma-joined roll numbers of absent students")]
    pub absent: String,
}

impl AttendanceRecord {
    pub fn present_count(&self) -> u32 {
        count_roll_numbers(&self.present)
    }

    pub fn absent_count(&self) -> u32 {
        count_roll_numbers(&self.absent)
    }
}

fn count_roll_numbers(list: &str) -> u32 {
    list.split(',').filter(|roll| !roll.trim().is_empty()).count() as u32
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SalaryRecord {
    #[serde(default)]
    pub staff: Option<String>,

    #[schemars(description = "Payout date in YYYY-MM-DD format")]
    pub date: NaiveDate,

    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExamRecord {
    pub class: String,

    pub subject: String,

    #[schemars(description = "Marks obtained by one student")]
    pub obtained: Decimal,

    #[schemars(description = "Maximum marks for the paper")]
    pub total: Decimal,
}

/// Everything one aggregation pass reads.
///
/// Optional sources left as `None` are treated as missing and contribute all-zero series;
/// `Some(vec![])` means the source exists but has no rows yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CohortInput {
    #[serde(default)]
    pub students: Vec<StudentRecord>,

    #[serde(default)]
    pub classes: Vec<ClassRecord>,

    #[serde(default)]
    pub attendance: Option<Vec<AttendanceRecord>>,

    #[serde(default)]
    pub salaries: Option<Vec<SalaryRecord>>,

    #[serde(default)]
    pub exams: Option<Vec<ExamRecord>>,
}

impl CohortInput {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(CohortInput)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
