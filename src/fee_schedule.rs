use crate::schema::ClassRecord;
use crate::utils::clamp_amount;
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Class name to monthly fee lookup, built once per aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    fees: HashMap<String, Decimal>,
}

impl FeeSchedule {
    /// Builds the lookup. When a class name appears twice the last record wins,
    /// matching how the store overwrites class settings.
    pub fn new(classes: &[ClassRecord]) -> Self {
        let fees = classes
            .iter()
            .map(|c| (c.name.clone(), clamp_amount(c.school_fees)))
            .collect();
        Self { fees }
    }

    /// Monthly fee for `class_name`, or `None` when no class record matches.
    pub fn lookup(&self, class_name: &str) -> Option<Decimal> {
        self.fees.get(class_name).copied()
    }

    /// Monthly fee for `class_name`; unknown classes carry no fee.
    pub fn fee_for(&self, class_name: &str) -> Decimal {
        self.lookup(class_name).unwrap_or_else(|| {
            debug!("No fee configured for class '{}', defaulting to 0", class_name);
            Decimal::ZERO
        })
    }

    pub fn len(&self) -> usize {
        self.fees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }
}

/// One-off lookup without keeping a schedule around.
pub fn resolve(class_name: &str, classes: &[ClassRecord]) -> Decimal {
    FeeSchedule::new(classes).fee_for(class_name)
}
