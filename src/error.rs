use std::time::Duration;

use thiserror::Error;

use crate::models::{GroundTruthField, ScorerKind};

/// Top-level error type for building and scoring evaluation batches.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Remote service error: {0}")]
    RemoteService(#[from] RemoteServiceError),

    #[error("Model returned no choices")]
    EmptyResponse,

    #[error(
        "Example #{index} ({input:?}) is missing {field} required by the {scorer} scorer"
    )]
    MissingGroundTruth {
        index: usize,
        input: String,
        scorer: ScorerKind,
        field: GroundTruthField,
    },

    #[error("Batch for run {run_name:?} contains no examples")]
    EmptyBatch { run_name: String },

    #[error("No scorers selected for run {run_name:?}")]
    NoScorers { run_name: String },

    #[error("Threshold {threshold} for the {scorer} scorer is outside [0, 1]")]
    InvalidThreshold { scorer: ScorerKind, threshold: f64 },

    #[error("Evaluation service error: {0}")]
    EvaluationService(#[from] EvaluationServiceError),

    #[error("Dataset store error: {0}")]
    DatasetStore(String),
}

/// Failure of the remote text-generation call.
#[derive(Debug, Error)]
pub enum RemoteServiceError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),
}

/// Failure of the remote scoring collaborator.
#[derive(Debug, Error)]
pub enum EvaluationServiceError {
    #[error("Run {run_name:?} already exists in project {project_name:?}")]
    RunExists {
        run_name: String,
        project_name: String,
    },

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;
