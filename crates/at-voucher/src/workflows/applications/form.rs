use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{DisabilityKind, MedicalProvider};
use super::eligibility::IncomeThreshold;
use crate::workflows::money::{format_cents, parse_dollars};

/// Whether the constituent is saving progress or handing the application in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionIntent {
    #[default]
    SaveDraft,
    Submit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalProviderForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub fax: String,
}

/// Raw web submission. Every field arrives as typed by the constituent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationForm {
    #[serde(default)]
    pub household_size: String,
    #[serde(default)]
    pub annual_income: String,
    #[serde(default)]
    pub disabilities: Vec<String>,
    #[serde(default)]
    pub maryland_resident: bool,
    #[serde(default)]
    pub self_certified: bool,
    #[serde(default)]
    pub medical_provider: Option<MedicalProviderForm>,
    #[serde(default)]
    pub intent: SubmissionIntent,
}

/// Normalized values ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedApplication {
    pub household_size: u32,
    pub annual_income_cents: u64,
    pub disabilities: BTreeSet<DisabilityKind>,
    pub maryland_resident: bool,
    pub self_certified: bool,
    pub medical_provider: Option<MedicalProvider>,
    pub intent: SubmissionIntent,
}

/// Field errors, keyed by field name, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors(pub BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field} {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

impl ApplicationForm {
    /// Drafts only need parseable values; submissions must also be complete and under the
    /// income threshold.
    pub fn validate(
        &self,
        threshold: &IncomeThreshold,
    ) -> Result<ValidatedApplication, FormErrors> {
        let submitting = self.intent == SubmissionIntent::Submit;
        let mut errors = FormErrors::default();

        let household_size = match self.household_size.trim() {
            "" if !submitting => 0,
            "" => {
                errors.add("household_size", "can't be blank");
                0
            }
            raw => match raw.parse::<u32>() {
                Ok(size) if size >= 1 => size,
                _ => {
                    errors.add("household_size", "must be a whole number of at least 1");
                    0
                }
            },
        };

        let annual_income_cents = match self.annual_income.trim() {
            "" if !submitting => 0,
            "" => {
                errors.add("annual_income", "can't be blank");
                0
            }
            raw => parse_dollars(raw).unwrap_or_else(|message| {
                errors.add("annual_income", message);
                0
            }),
        };

        let mut disabilities = BTreeSet::new();
        for raw in &self.disabilities {
            match raw.parse::<DisabilityKind>() {
                Ok(kind) => {
                    disabilities.insert(kind);
                }
                Err(message) => errors.add("disabilities", message),
            }
        }

        let medical_provider = self
            .medical_provider
            .as_ref()
            .and_then(normalize_provider);

        if submitting {
            if disabilities.is_empty() {
                errors.add("disabilities", "must include at least one disability");
            }
            if !self.maryland_resident {
                errors.add("maryland_resident", "must be confirmed");
            }
            if !self.self_certified {
                errors.add("self_certified", "must be accepted");
            }
            if medical_provider.is_none() {
                errors.add("medical_provider", "name is required");
            }
            if household_size >= 1 && !errors.contains("annual_income") {
                let check = threshold.check(household_size, annual_income_cents);
                if !check.eligible {
                    errors.add(
                        "annual_income",
                        format!(
                            "exceeds the program limit of {} for a household of {}",
                            format_cents(check.threshold_cents),
                            household_size
                        ),
                    );
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedApplication {
            household_size,
            annual_income_cents,
            disabilities,
            maryland_resident: self.maryland_resident,
            self_certified: self.self_certified,
            medical_provider,
            intent: self.intent,
        })
    }
}

fn normalize_provider(form: &MedicalProviderForm) -> Option<MedicalProvider> {
    let name = form.name.trim();
    if name.is_empty() {
        return None;
    }
    let optional = |value: &str| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };
    Some(MedicalProvider {
        name: name.to_string(),
        email: optional(&form.email).map(|email| email.to_ascii_lowercase()),
        phone: optional(&form.phone),
        fax: optional(&form.fax),
    })
}
