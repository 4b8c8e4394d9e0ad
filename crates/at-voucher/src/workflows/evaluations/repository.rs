use super::domain::{Evaluation, EvaluationId};
use crate::store::RepositoryError;
use crate::workflows::accounts::UserId;
use crate::workflows::applications::ApplicationId;

pub trait EvaluationRepository: Send + Sync {
    fn insert_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError>;
    /// Fails with `Conflict` when the stored evaluation no longer equals `current`.
    fn update_evaluation(
        &self,
        current: &Evaluation,
        updated: Evaluation,
    ) -> Result<(), RepositoryError>;
    fn fetch_evaluation(&self, id: &EvaluationId) -> Result<Option<Evaluation>, RepositoryError>;
    fn evaluations_for_evaluator(
        &self,
        evaluator_id: &UserId,
    ) -> Result<Vec<Evaluation>, RepositoryError>;
    fn evaluations_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Evaluation>, RepositoryError>;
}
