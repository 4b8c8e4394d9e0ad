use serde::Serialize;

use crate::config::ProgramConfig;

/// Income ceiling derived from the federal poverty level and the program modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomeThreshold {
    base_cents: u64,
    increment_cents: u64,
    modifier_percent: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EligibilityCheck {
    pub household_size: u32,
    pub annual_income_cents: u64,
    pub threshold_cents: u64,
    pub eligible: bool,
}

impl IncomeThreshold {
    pub fn new(base_cents: u64, increment_cents: u64, modifier_percent: u64) -> Self {
        Self {
            base_cents,
            increment_cents,
            modifier_percent,
        }
    }

    pub fn from_config(config: &ProgramConfig) -> Self {
        Self::new(
            config.fpl_base_cents,
            config.fpl_increment_cents,
            config.fpl_modifier_percent,
        )
    }

    /// Federal poverty level for the household. A household always counts at least one person.
    pub fn poverty_level_cents(&self, household_size: u32) -> u64 {
        let additional = u64::from(household_size.max(1) - 1);
        self.base_cents
            .saturating_add(self.increment_cents.saturating_mul(additional))
    }

    pub fn threshold_cents(&self, household_size: u32) -> u64 {
        self.poverty_level_cents(household_size)
            .saturating_mul(self.modifier_percent)
            / 100
    }

    pub fn check(&self, household_size: u32, annual_income_cents: u64) -> EligibilityCheck {
        let threshold_cents = self.threshold_cents(household_size);
        EligibilityCheck {
            household_size,
            annual_income_cents,
            threshold_cents,
            eligible: annual_income_cents <= threshold_cents,
        }
    }
}
