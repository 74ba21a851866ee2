use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::dataset::DatasetStore;
use crate::error::{EvalError, EvaluationServiceError};
use crate::evaluation::{EvaluationRequest, Evaluator};
use crate::models::{Batch, DatasetHandle, Example, ScorerResult};

type ServiceResult<T> = std::result::Result<T, EvaluationServiceError>;

/// HTTP client for the Judgment evaluation API
#[derive(Clone)]
pub struct JudgmentClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    organization_id: String,
}

#[derive(Serialize)]
struct RunNameQuery<'a> {
    eval_name: &'a str,
    project_name: &'a str,
}

#[derive(Deserialize)]
struct RunNameExists {
    exists: bool,
}

#[derive(Serialize)]
struct WireScorer {
    score_type: &'static str,
    threshold: f64,
}

#[derive(Serialize)]
struct EvaluatePayload<'a> {
    project_name: &'a str,
    eval_name: &'a str,
    model: &'a str,
    #[serde(rename = "override")]
    override_existing_run: bool,
    examples: &'a [Example],
    scorers: Vec<WireScorer>,
}

#[derive(Deserialize)]
struct WireScoringResult {
    #[serde(default)]
    scorers_data: Option<Vec<WireScorerData>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WireScorerData {
    name: String,
    threshold: f64,
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
struct DatasetPushPayload<'a> {
    dataset_alias: &'a str,
    project_name: &'a str,
    examples: &'a [Example],
    overwrite: bool,
}

impl JudgmentClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        organization_id: &str,
        timeout: Option<Duration>,
    ) -> ServiceResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| EvaluationServiceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            organization_id: organization_id.to_string(),
        })
    }

    /// Create the client from the run configuration, reading credentials from the environment
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let judgment = &config.judgment;
        let api_key = std::env::var(&judgment.env_var_api_key).with_context(|| {
            format!("Environment variable {} not found", judgment.env_var_api_key)
        })?;
        let organization_id = std::env::var(&judgment.env_var_org_id).with_context(|| {
            format!("Environment variable {} not found", judgment.env_var_org_id)
        })?;

        Ok(Self::new(
            &judgment.api_endpoint,
            &api_key,
            &organization_id,
            config.request_timeout(),
        )?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST `body` and decode a successful JSON answer; `on_conflict` maps HTTP 409
    async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        on_conflict: impl FnOnce() -> EvaluationServiceError,
    ) -> ServiceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!(%url, "Calling evaluation service");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Organization-Id", &self.organization_id)
            .json(body)
            .send()
            .await
            .map_err(|e| EvaluationServiceError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EvaluationServiceError::Transport(e.to_string()))?;

        match status.as_u16() {
            200..=299 => serde_json::from_str(&text)
                .map_err(|e| EvaluationServiceError::MalformedResponse(e.to_string())),
            401 | 403 => Err(EvaluationServiceError::Unauthorized(text)),
            409 => Err(on_conflict()),
            status => Err(EvaluationServiceError::Rejected { status, body: text }),
        }
    }

    async fn run_name_exists(&self, project_name: &str, run_name: &str) -> ServiceResult<bool> {
        let query = RunNameQuery {
            eval_name: run_name,
            project_name,
        };
        let answer: RunNameExists = self
            .post("eval-run-name-exists/", &query, || {
                EvaluationServiceError::Rejected {
                    status: 409,
                    body: "conflict while checking run name".to_string(),
                }
            })
            .await?;
        Ok(answer.exists)
    }

    /// Upload examples as a named dataset
    pub async fn push_dataset(
        &self,
        alias: &str,
        project_name: &str,
        examples: &[Example],
        overwrite: bool,
    ) -> ServiceResult<DatasetHandle> {
        let payload = DatasetPushPayload {
            dataset_alias: alias,
            project_name,
            examples,
            overwrite,
        };
        let _: serde_json::Value = self
            .post("datasets/push/", &payload, || EvaluationServiceError::Rejected {
                status: 409,
                body: format!("dataset {:?} already exists", alias),
            })
            .await?;

        Ok(DatasetHandle {
            alias: alias.to_string(),
            project_name: project_name.to_string(),
            location: format!("{}#{}", self.endpoint("datasets/"), alias),
        })
    }

    fn into_results(wire: Vec<WireScoringResult>) -> ServiceResult<Vec<Vec<ScorerResult>>> {
        wire.into_iter()
            .enumerate()
            .map(|(index, result)| match result.scorers_data {
                Some(data) => Ok(data
                    .into_iter()
                    .map(|d| ScorerResult {
                        scorer: d.name,
                        threshold: d.threshold,
                        score: d.score,
                        success: d.success,
                        reason: d.reason,
                    })
                    .collect()),
                None => Err(EvaluationServiceError::MalformedResponse(format!(
                    "example #{} has no scorer data{}",
                    index,
                    result
                        .error
                        .map(|e| format!(": {}", e))
                        .unwrap_or_default()
                ))),
            })
            .collect()
    }
}

#[async_trait]
impl Evaluator for JudgmentClient {
    async fn evaluate(&self, request: &EvaluationRequest) -> ServiceResult<Vec<Vec<ScorerResult>>> {
        let run_exists = || EvaluationServiceError::RunExists {
            run_name: request.run_name.clone(),
            project_name: request.project_name.clone(),
        };

        if !request.override_existing_run
            && self
                .run_name_exists(&request.project_name, &request.run_name)
                .await?
        {
            return Err(run_exists());
        }

        let payload = EvaluatePayload {
            project_name: &request.project_name,
            eval_name: &request.run_name,
            model: &request.model,
            override_existing_run: request.override_existing_run,
            examples: &request.examples,
            scorers: request
                .scorers
                .iter()
                .map(|s| WireScorer {
                    score_type: s.kind.as_str(),
                    threshold: s.threshold,
                })
                .collect(),
        };

        let wire: Vec<WireScoringResult> = self.post("evaluate/", &payload, run_exists).await?;
        Self::into_results(wire)
    }
}

/// Dataset storage backed by the evaluation service
pub struct JudgmentDatasets {
    client: JudgmentClient,
    project_name: String,
    overwrite: bool,
}

impl JudgmentDatasets {
    pub fn new(client: JudgmentClient, project_name: impl Into<String>, overwrite: bool) -> Self {
        Self {
            client,
            project_name: project_name.into(),
            overwrite,
        }
    }
}

#[async_trait]
impl DatasetStore for JudgmentDatasets {
    async fn save(&self, batch: &Batch) -> crate::error::Result<DatasetHandle> {
        self.client
            .push_dataset(&batch.name, &self.project_name, &batch.examples, self.overwrite)
            .await
            .map_err(|e| EvalError::DatasetStore(e.to_string()))
    }
}
