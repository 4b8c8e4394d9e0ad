use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use super::domain::{Evaluation, EvaluationId, EvaluationStatus};
use super::repository::EvaluationRepository;
use crate::store::RepositoryError;
use crate::workflows::accounts::{User, UserId, UserRole};
use crate::workflows::applications::Application;
use crate::workflows::audit::{self, Event, EventLog};
use crate::workflows::notifications::{NotificationAction, NotificationService};
use crate::workflows::sequence::Sequence;

static EVALUATION_SEQUENCE: Sequence = Sequence::new("evl");

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("evaluation {0} not found")]
    NotFound(EvaluationId),
    #[error("evaluation is assigned to another evaluator")]
    NotAssigned,
    #[error("cannot {action} an evaluation that is {}", .from.label())]
    InvalidTransition {
        from: EvaluationStatus,
        action: &'static str,
    },
    #[error("evaluation must be scheduled in the future")]
    ScheduledInPast,
    #[error("location can't be blank")]
    MissingLocation,
    #[error("at least one recommended product is required")]
    NoRecommendations,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct EvaluationService {
    evaluations: Arc<dyn EvaluationRepository>,
    events: Arc<dyn EventLog>,
    notifications: Arc<NotificationService>,
}

impl EvaluationService {
    pub fn new(
        evaluations: Arc<dyn EvaluationRepository>,
        events: Arc<dyn EventLog>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            evaluations,
            events,
            notifications,
        }
    }

    /// Open an evaluation for `evaluator`. Any evaluation still open on the application is
    /// cancelled, so reassignment is a single call.
    pub fn request(
        &self,
        admin_id: &UserId,
        application: &Application,
        evaluator: &User,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EvaluationError> {
        for open in self
            .evaluations
            .evaluations_for_application(&application.id)?
            .into_iter()
            .filter(|evaluation| evaluation.status.is_open())
        {
            let mut cancelled = open.clone();
            cancelled.status = EvaluationStatus::Cancelled;
            cancelled.updated_at = now;
            self.evaluations.update_evaluation(&open, cancelled)?;
        }

        let evaluation = Evaluation {
            id: EvaluationId(EVALUATION_SEQUENCE.next_id()),
            application_id: application.id.clone(),
            evaluator_id: evaluator.id.clone(),
            constituent_id: application.user_id.clone(),
            status: EvaluationStatus::Requested,
            scheduled_for: None,
            location: None,
            recommended_products: Vec::new(),
            notes: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let stored = self.evaluations.insert_evaluation(evaluation)?;
        self.record(Some(admin_id), "evaluation_requested", &stored, now);
        Ok(stored)
    }

    pub fn schedule(
        &self,
        evaluator: &User,
        id: &EvaluationId,
        scheduled_for: DateTime<Utc>,
        location: String,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EvaluationError> {
        let current = self.fetch_assigned(evaluator, id)?;
        let mut evaluation = current.clone();
        if !evaluation.status.is_open() {
            return Err(EvaluationError::InvalidTransition {
                from: evaluation.status,
                action: "schedule",
            });
        }
        if scheduled_for <= now {
            return Err(EvaluationError::ScheduledInPast);
        }
        let location = location.trim().to_string();
        if location.is_empty() {
            return Err(EvaluationError::MissingLocation);
        }

        evaluation.status = EvaluationStatus::Scheduled;
        evaluation.scheduled_for = Some(scheduled_for);
        evaluation.location = Some(location.clone());
        evaluation.updated_at = now;
        self.evaluations
            .update_evaluation(&current, evaluation.clone())?;

        self.record(Some(&evaluator.id), "evaluation_scheduled", &evaluation, now);
        self.notifications.dispatch(
            &evaluation.constituent_id,
            Some(&evaluator.id),
            NotificationAction::EvaluationScheduled {
                evaluation_id: evaluation.id.0.clone(),
                scheduled_for,
                location,
            },
            now,
        );
        Ok(evaluation)
    }

    pub fn complete(
        &self,
        evaluator: &User,
        id: &EvaluationId,
        recommended_products: Vec<String>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EvaluationError> {
        let current = self.fetch_assigned(evaluator, id)?;
        let mut evaluation = current.clone();
        if evaluation.status != EvaluationStatus::Scheduled {
            return Err(EvaluationError::InvalidTransition {
                from: evaluation.status,
                action: "complete",
            });
        }
        let products: Vec<String> = recommended_products
            .into_iter()
            .map(|product| product.trim().to_string())
            .filter(|product| !product.is_empty())
            .collect();
        if products.is_empty() {
            return Err(EvaluationError::NoRecommendations);
        }

        evaluation.status = EvaluationStatus::Completed;
        evaluation.recommended_products = products.clone();
        evaluation.notes = notes.filter(|notes| !notes.trim().is_empty());
        evaluation.completed_at = Some(now);
        evaluation.updated_at = now;
        self.evaluations
            .update_evaluation(&current, evaluation.clone())?;

        info!(evaluation = %evaluation.id.0, products = products.len(), "evaluation completed");
        self.record(Some(&evaluator.id), "evaluation_completed", &evaluation, now);
        self.notifications.dispatch(
            &evaluation.constituent_id,
            Some(&evaluator.id),
            NotificationAction::EvaluationCompleted {
                evaluation_id: evaluation.id.0.clone(),
                recommended_products: products,
            },
            now,
        );
        Ok(evaluation)
    }

    pub fn cancel(
        &self,
        actor: &User,
        id: &EvaluationId,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EvaluationError> {
        let current = if actor.role == UserRole::Administrator {
            self.fetch(id)?
        } else {
            self.fetch_assigned(actor, id)?
        };
        let mut evaluation = current.clone();
        if !evaluation.status.is_open() {
            return Err(EvaluationError::InvalidTransition {
                from: evaluation.status,
                action: "cancel",
            });
        }
        evaluation.status = EvaluationStatus::Cancelled;
        evaluation.updated_at = now;
        self.evaluations
            .update_evaluation(&current, evaluation.clone())?;
        self.record(Some(&actor.id), "evaluation_cancelled", &evaluation, now);
        Ok(evaluation)
    }

    /// Open work first, soonest appointment first.
    pub fn list_for_evaluator(&self, evaluator: &User) -> Result<Vec<Evaluation>, EvaluationError> {
        let mut evaluations = self.evaluations.evaluations_for_evaluator(&evaluator.id)?;
        evaluations.sort_by(|left, right| {
            right
                .status
                .is_open()
                .cmp(&left.status.is_open())
                .then_with(|| left.scheduled_for.cmp(&right.scheduled_for))
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        Ok(evaluations)
    }

    fn fetch(&self, id: &EvaluationId) -> Result<Evaluation, EvaluationError> {
        self.evaluations
            .fetch_evaluation(id)?
            .ok_or_else(|| EvaluationError::NotFound(id.clone()))
    }

    fn fetch_assigned(
        &self,
        evaluator: &User,
        id: &EvaluationId,
    ) -> Result<Evaluation, EvaluationError> {
        let evaluation = self.fetch(id)?;
        if evaluation.evaluator_id != evaluator.id {
            return Err(EvaluationError::NotAssigned);
        }
        Ok(evaluation)
    }

    fn record(
        &self,
        actor_id: Option<&UserId>,
        action: &str,
        evaluation: &Evaluation,
        now: DateTime<Utc>,
    ) {
        audit::record(
            self.events.as_ref(),
            Event::new(
                actor_id,
                action,
                "evaluation",
                &evaluation.id.0,
                json!({
                    "application": evaluation.application_id.0,
                    "status": evaluation.status.label(),
                }),
                now,
            ),
        );
    }
}
