//! Fixtures shared by the unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc::UnboundedReceiver;

use super::accounts::{
    CommunicationPreference, User, UserId, UserRepository, UserRole, VendorStatus,
};
use super::applications::{
    Application, ApplicationId, ApplicationRepository, ApplicationStatus, DisabilityKind,
    MedicalCertificationStatus, MedicalProvider,
};
use super::notifications::{DeliveryJob, NotificationQueue};
use super::proofs::ProofStatus;
use super::services::Services;
use crate::config::ProgramConfig;
use crate::store::MemoryStore;

pub(crate) const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub(crate) const PROVIDER_EMAIL: &str = "lortiz@clinic.example";

/// Fixture application numbers start far above the service's own sequence.
static FIXTURE_APPLICATION: AtomicU64 = AtomicU64::new(900_001);

fn user(id: &str, role: UserRole, first_name: &str, last_name: &str, domain: &str) -> User {
    User {
        id: UserId(id.to_string()),
        email: format!("{id}@{domain}"),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        role,
        phone: None,
        fax: None,
        address: None,
        communication_preference: CommunicationPreference::Email,
        vendor_status: None,
    }
}

pub(crate) fn constituent(id: &str) -> User {
    user(id, UserRole::Constituent, "Casey", "Rivera", "residents.example")
}

pub(crate) fn admin(id: &str) -> User {
    user(id, UserRole::Administrator, "Morgan", "Hale", "program.example")
}

pub(crate) fn evaluator_user(id: &str) -> User {
    user(id, UserRole::Evaluator, "Jordan", "Okafor", "evaluators.example")
}

pub(crate) fn vendor_user(id: &str, approved: bool) -> User {
    let mut vendor = user(id, UserRole::Vendor, "Avery", "Lindqvist", "vendors.example");
    vendor.vendor_status = Some(if approved {
        VendorStatus::Approved
    } else {
        VendorStatus::Pending
    });
    vendor
}

/// Services over a fresh store, with an administrator already registered.
pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub services: Arc<Services>,
    pub admin: User,
    pub receiver: UnboundedReceiver<DeliveryJob>,
}

pub(crate) fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let (queue, receiver) = NotificationQueue::channel();
    let services = Arc::new(Services::new(
        store.clone(),
        &ProgramConfig::default(),
        WEBHOOK_SECRET,
        queue,
    ));
    let admin = store.insert_user(admin("usr-admin")).expect("insert admin");
    Harness {
        store,
        services,
        admin,
        receiver,
    }
}

pub(crate) fn vendor(harness: &Harness, id: &str, approved: bool) -> User {
    harness
        .store
        .insert_user(vendor_user(id, approved))
        .expect("insert vendor")
}

pub(crate) fn evaluator(harness: &Harness, id: &str) -> User {
    harness
        .store
        .insert_user(evaluator_user(id))
        .expect("insert evaluator")
}

fn application_for(harness: &Harness, user_id: &str, status: ApplicationStatus) -> Application {
    let owner = harness
        .store
        .insert_user(constituent(user_id))
        .expect("insert constituent");
    let created_at = Utc
        .with_ymd_and_hms(2025, 1, 15, 14, 0, 0)
        .single()
        .expect("valid time");
    let approved = status == ApplicationStatus::Approved;
    let application = Application {
        id: ApplicationId(format!(
            "app-{:06}",
            FIXTURE_APPLICATION.fetch_add(1, Ordering::Relaxed)
        )),
        user_id: owner.id,
        status,
        household_size: 2,
        annual_income_cents: 3_200_000,
        maryland_resident: true,
        self_certified: true,
        disabilities: BTreeSet::from([DisabilityKind::Hearing, DisabilityKind::Vision]),
        medical_provider: Some(MedicalProvider {
            name: "Dr. Lena Ortiz".to_string(),
            email: Some(PROVIDER_EMAIL.to_string()),
            phone: None,
            fax: Some("410-555-0199".to_string()),
        }),
        income_proof: if approved { ProofStatus::Approved } else { ProofStatus::NotSubmitted },
        residency_proof: if approved { ProofStatus::Approved } else { ProofStatus::NotSubmitted },
        medical_certification: if approved {
            MedicalCertificationStatus::Approved
        } else {
            MedicalCertificationStatus::NotRequested
        },
        evaluator_id: None,
        rejection_count: 0,
        status_reason: None,
        submitted_at: Some(created_at),
        created_at,
        updated_at: created_at,
    };
    harness
        .store
        .insert_application(application)
        .expect("insert application")
}

/// An application under review, owned by a new constituent `user_id`.
pub(crate) fn submitted_application(harness: &Harness, user_id: &str) -> Application {
    application_for(harness, user_id, ApplicationStatus::InProgress)
}

/// An approved application (hearing and vision) owned by a new constituent `user_id`.
pub(crate) fn approved_application(harness: &Harness, user_id: &str) -> Application {
    application_for(harness, user_id, ApplicationStatus::Approved)
}
