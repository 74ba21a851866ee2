use std::sync::Arc;
use tracing::info;

use crate::error::{EvalError, EvaluationServiceError, Result};
use crate::evaluation::{EvaluationRequest, Evaluator};
use crate::models::{
    Batch, EvaluationRun, Example, ExampleResult, ScorerResult, ScoringStrategy,
};
use crate::statistics::calculate_statistics;

/// Submits batches to the scoring service under a project
#[derive(Clone)]
pub struct BatchRunner {
    evaluator: Arc<dyn Evaluator>,
    project_name: String,
}

impl BatchRunner {
    pub fn new(evaluator: Arc<dyn Evaluator>, project_name: impl Into<String>) -> Self {
        Self {
            evaluator,
            project_name: project_name.into(),
        }
    }

    /// Score `batch` with every scorer under `run_name`.
    ///
    /// Preconditions are checked before anything is sent: the batch must be
    /// non-empty, at least one scorer must be selected, and every example must
    /// carry the ground truth each scorer needs.
    pub async fn run(
        &self,
        batch: Batch,
        run_name: &str,
        scorers: &[ScoringStrategy],
        model_id: &str,
        override_existing_run: bool,
    ) -> Result<EvaluationRun> {
        Self::check_preconditions(&batch, run_name, scorers)?;

        info!(
            run = run_name,
            project = %self.project_name,
            examples = batch.len(),
            scorers = scorers.len(),
            "Submitting batch for scoring"
        );

        let request = EvaluationRequest {
            project_name: self.project_name.clone(),
            run_name: run_name.to_string(),
            model: model_id.to_string(),
            override_existing_run,
            examples: batch.examples,
            scorers: scorers.to_vec(),
        };

        let verdicts = self.evaluator.evaluate(&request).await?;
        let results = Self::align(request.examples, verdicts, scorers.len())?;

        let scorer_names: Vec<String> = scorers.iter().map(|s| s.kind.to_string()).collect();
        let statistics = calculate_statistics(&results, &scorer_names);

        Ok(EvaluationRun {
            run_name: request.run_name,
            project_name: request.project_name,
            results,
            statistics,
        })
    }

    fn check_preconditions(
        batch: &Batch,
        run_name: &str,
        scorers: &[ScoringStrategy],
    ) -> Result<()> {
        if batch.is_empty() {
            return Err(EvalError::EmptyBatch {
                run_name: run_name.to_string(),
            });
        }
        if scorers.is_empty() {
            return Err(EvalError::NoScorers {
                run_name: run_name.to_string(),
            });
        }

        for strategy in scorers {
            let Some(field) = strategy.kind.required_field() else {
                continue;
            };
            if let Some((index, example)) = batch
                .examples
                .iter()
                .enumerate()
                .find(|(_, example)| !example.has(field))
            {
                return Err(EvalError::MissingGroundTruth {
                    index,
                    input: example.input.clone(),
                    scorer: strategy.kind,
                    field,
                });
            }
        }

        Ok(())
    }

    /// Pair each example with its verdicts, rejecting responses that do not cover the batch.
    ///
    /// Verdicts are matched to scorers by position.
    fn align(
        examples: Vec<Example>,
        verdicts: Vec<Vec<ScorerResult>>,
        scorer_count: usize,
    ) -> Result<Vec<ExampleResult>> {
        if verdicts.len() != examples.len() {
            return Err(EvaluationServiceError::MalformedResponse(format!(
                "expected results for {} examples, got {}",
                examples.len(),
                verdicts.len()
            ))
            .into());
        }
        if let Some((index, scores)) = verdicts
            .iter()
            .enumerate()
            .find(|(_, scores)| scores.len() != scorer_count)
        {
            return Err(EvaluationServiceError::MalformedResponse(format!(
                "example #{} has {} verdicts, expected {}",
                index,
                scores.len(),
                scorer_count
            ))
            .into());
        }

        Ok(examples
            .into_iter()
            .zip(verdicts)
            .map(|(example, scores)| ExampleResult { example, scores })
            .collect())
    }
}
