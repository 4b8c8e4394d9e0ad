//! Evaluator assessments that recommend equipment for an approved constituent.

pub mod domain;
pub mod repository;
pub(crate) mod router;
pub mod service;

pub use domain::{Evaluation, EvaluationId, EvaluationStatus};
pub use repository::EvaluationRepository;
pub use service::{EvaluationError, EvaluationService};
