//! End-to-end scenarios through the public HTTP router: an application from intake to a paid
//! vendor invoice, and the password reset loop over the email transport.

mod common {
    use std::sync::Arc;

    use at_voucher::config::{NotificationConfig, ProgramConfig};
    use at_voucher::store::MemoryStore;
    use at_voucher::workflows::accounts::{
        CommunicationPreference, User, UserId, UserRepository, UserRole, VendorStatus,
    };
    use at_voucher::workflows::notifications::{
        DeliveryChannel, DeliveryJob, DeliveryWorker, EmailOutbox, NotificationQueue,
    };
    use at_voucher::workflows::{router, Services};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tower::ServiceExt;

    pub(super) const ACTOR: &str = "x-user-id";

    pub(super) struct Program {
        pub(super) app: Router,
        pub(super) email: EmailOutbox,
        worker: DeliveryWorker,
        receiver: UnboundedReceiver<DeliveryJob>,
    }

    impl Program {
        pub(super) fn start() -> Self {
            let store = Arc::new(MemoryStore::default());
            let (queue, receiver) = NotificationQueue::channel();
            let services = Arc::new(Services::new(
                store.clone(),
                &ProgramConfig::default(),
                "integration-secret",
                queue.clone(),
            ));
            for user in [
                user("usr-casey", UserRole::Constituent, "Casey", "Rivera"),
                user("usr-morgan", UserRole::Administrator, "Morgan", "Hale"),
                vendor("usr-avery"),
            ] {
                store.insert_user(user).expect("seed user");
            }

            let email = EmailOutbox::default();
            let worker = DeliveryWorker::new(
                store.clone(),
                store.clone(),
                vec![Arc::new(email.clone()) as Arc<dyn DeliveryChannel>],
                queue,
                NotificationConfig::default(),
            );
            Self {
                app: router(services),
                email,
                worker,
                receiver,
            }
        }

        /// Deliver everything queued so far.
        pub(super) fn flush_notifications(&mut self) {
            while let Ok(job) = self.receiver.try_recv() {
                self.worker.deliver(&job, Utc::now());
            }
        }

        pub(super) async fn call(
            &self,
            method: &str,
            uri: &str,
            actor: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(actor) = actor {
                builder = builder.header(ACTOR, actor);
            }
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string())),
                None => builder.body(Body::empty()),
            }
            .expect("request");
            let response = self.app.clone().oneshot(request).await.expect("response");
            let status = response.status();
            (status, json(response).await)
        }
    }

    async fn json(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), 4 * 1024 * 1024)
            .await
            .expect("body");
        if bytes.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    }

    fn user(id: &str, role: UserRole, first_name: &str, last_name: &str) -> User {
        User {
            id: UserId(id.to_string()),
            email: format!("{id}@example.org"),
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

    fn vendor(id: &str) -> User {
        let mut vendor = user(id, UserRole::Vendor, "Avery", "Lindqvist");
        vendor.vendor_status = Some(VendorStatus::Approved);
        vendor
    }
}

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};
use common::Program;
use serde_json::json;

use axum::http::StatusCode;

#[tokio::test]
async fn application_to_paid_invoice() {
    let mut program = Program::start();

    let (status, application) = program
        .call(
            "POST",
            "/api/v1/applications",
            Some("usr-casey"),
            Some(json!({
                "household_size": "2",
                "annual_income": "$31,000",
                "disabilities": ["hearing", "vision"],
                "maryland_resident": true,
                "self_certified": true,
                "medical_provider": { "name": "Dr. Lena Ortiz", "email": "lortiz@clinic.example" },
                "intent": "submit",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{application}");
    assert_eq!(application["status"], "in_progress");
    let id = application["id"].as_str().expect("application id").to_string();

    let (status, _) = program
        .call(
            "POST",
            "/api/v1/applications",
            Some("usr-casey"),
            Some(json!({ "intent": "save_draft" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for (proof_type, filename) in [("income", "w2.pdf"), ("residency", "lease.png")] {
        let (status, body) = program
            .call(
                "POST",
                &format!("/api/v1/applications/{id}/proofs"),
                Some("usr-casey"),
                Some(json!({
                    "proof_type": proof_type,
                    "filename": filename,
                    "content_base64": STANDARD.encode(b"scanned document"),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let (status, body) = program
            .call(
                "POST",
                &format!("/api/v1/admin/applications/{id}/proofs/{proof_type}/review"),
                Some("usr-morgan"),
                Some(json!({ "decision": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, body) = program
        .call(
            "POST",
            &format!("/api/v1/admin/applications/{id}/approve"),
            Some("usr-morgan"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("medical certification")));

    for decision in ["requested", "received", "approved"] {
        let (status, body) = program
            .call(
                "POST",
                &format!("/api/v1/admin/applications/{id}/medical-certification"),
                Some("usr-morgan"),
                Some(json!({ "decision": decision })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{decision}: {body}");
    }

    let (status, approval) = program
        .call(
            "POST",
            &format!("/api/v1/admin/applications/{id}/approve"),
            Some("usr-morgan"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{approval}");
    assert_eq!(approval["application"]["status"], "approved");
    assert_eq!(approval["voucher"]["initial_value_cents"], 1_000_000);
    let code = approval["voucher"]["code"]
        .as_str()
        .expect("voucher code")
        .to_string();

    let (status, redemption) = program
        .call(
            "POST",
            &format!("/api/v1/vendor/vouchers/{code}/redeem"),
            Some("usr-avery"),
            Some(json!({ "amount_cents": 420_000, "products": ["Captioned telephone"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{redemption}");
    assert_eq!(redemption["remaining_value_cents"], 580_000);

    let now = Utc::now();
    let (status, invoices) = program
        .call(
            "POST",
            "/api/v1/admin/invoices/generate",
            Some("usr-morgan"),
            Some(json!({ "start": now - Duration::hours(1), "end": now + Duration::hours(1) })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{invoices}");
    let invoice_id = invoices[0]["id"].as_str().expect("invoice id").to_string();
    assert_eq!(invoices[0]["total_cents"], 420_000);

    let (status, _) = program
        .call(
            "POST",
            &format!("/api/v1/admin/invoices/{invoice_id}/payment"),
            Some("usr-morgan"),
            Some(json!({ "check_number": "10442" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = program
        .call(
            "POST",
            &format!("/api/v1/admin/invoices/{invoice_id}/approve"),
            Some("usr-morgan"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, paid) = program
        .call(
            "POST",
            &format!("/api/v1/admin/invoices/{invoice_id}/payment"),
            Some("usr-morgan"),
            Some(json!({ "check_number": "10442" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{paid}");
    assert_eq!(paid["status"], "paid");

    program.flush_notifications();
    let sent = program.email.messages();
    let to_casey: Vec<_> = sent
        .iter()
        .filter(|message| message.destination == "usr-casey@example.org")
        .collect();
    assert!(to_casey.len() >= 4, "constituent saw {} emails", to_casey.len());
    assert!(sent
        .iter()
        .any(|message| message.destination == "usr-avery@example.org"));

    let (status, inbox) = program
        .call("GET", "/api/v1/notifications", Some("usr-casey"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(inbox
        .as_array()
        .is_some_and(|items| items.iter().all(|item| item["delivery_status"] == "sent")));
}

#[tokio::test]
async fn password_reset_over_email() {
    let mut program = Program::start();

    let (status, _) = program
        .call(
            "POST",
            "/api/v1/password-resets",
            None,
            Some(json!({ "email": "USR-CASEY@example.org" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = program
        .call(
            "POST",
            "/api/v1/password-resets",
            None,
            Some(json!({ "email": "stranger@example.org" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    program.flush_notifications();
    let messages = program.email.messages();
    assert_eq!(messages.len(), 1);
    let token = messages[0]
        .body
        .split("password: ")
        .nth(1)
        .and_then(|rest| rest.split('.').next())
        .expect("token in body")
        .to_string();

    let (status, _) = program
        .call(
            "PUT",
            "/api/v1/password-resets",
            None,
            Some(json!({ "token": token, "password": "a long passphrase" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = program
        .call(
            "PUT",
            "/api/v1/password-resets",
            None,
            Some(json!({ "token": token, "password": "a long passphrase" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
}
