use async_trait::async_trait;
use serde::Serialize;

use crate::error::EvaluationServiceError;
use crate::models::{Example, ScorerResult, ScoringStrategy};

/// Everything the scoring service needs to judge one batch
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest {
    /// Project (namespace) the run is recorded under
    pub project_name: String,
    /// Name of the run
    pub run_name: String,
    /// Model the scorers use for judging
    pub model: String,
    /// Replace an earlier run of the same name instead of rejecting it
    pub override_existing_run: bool,
    /// Examples to score, in batch order
    pub examples: Vec<Example>,
    /// Scorers applied to every example
    pub scorers: Vec<ScoringStrategy>,
}

/// Remote scoring service
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Score every example with every scorer.
    ///
    /// Returns one entry per example, in request order, each holding one verdict per scorer.
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<Vec<Vec<ScorerResult>>, EvaluationServiceError>;
}
