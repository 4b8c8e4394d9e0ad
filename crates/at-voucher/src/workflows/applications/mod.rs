//! Constituent applications: intake form, income eligibility, and the review lifecycle.

pub mod domain;
pub mod eligibility;
pub mod form;
pub mod repository;
pub(crate) mod router;
pub mod service;

pub use domain::{
    Application, ApplicationId, ApplicationStatus, DisabilityKind, MedicalCertificationStatus,
    MedicalProvider,
};
pub use eligibility::{EligibilityCheck, IncomeThreshold};
pub use form::{ApplicationForm, FormErrors, MedicalProviderForm, SubmissionIntent};
pub use repository::ApplicationRepository;
pub use service::{ApplicationService, ApplicationServiceError, CertificationDecision};
