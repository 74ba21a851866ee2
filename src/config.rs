use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::models::{ExampleSpec, ScorerKind, ScoringStrategy};

/// Pass/fail threshold used for any scorer without an explicit entry
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Root configuration for a battery of evaluation batches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Project (namespace) the runs are recorded under
    pub project_name: String,
    /// Model that answers the questions
    pub model: String,
    /// Model the evaluation service uses for judging; defaults to `model`
    #[serde(default)]
    pub judge_model: Option<String>,
    /// OpenAI-compatible API endpoint
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    #[serde(default = "default_env_var_api_key")]
    pub env_var_api_key: String,
    /// Sampling temperature, left to the provider when unset
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Maximum tokens per answer, left to the provider when unset
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Per-call timeout for remote requests; 0 disables it
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Number of answers generated concurrently within a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Label prefixed to every question
    #[serde(default = "default_prompt_label")]
    pub prompt_label: String,
    /// Wrap remote collaborators in call tracing
    #[serde(default)]
    pub trace_calls: bool,
    /// Pass/fail threshold per scorer name
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    /// Evaluation service settings
    #[serde(default)]
    pub judgment: JudgmentConfig,
    /// Optional persistence of each batch before it is scored
    #[serde(default)]
    pub dataset: Option<DatasetConfig>,
    /// Batches to build and score, in order
    pub batches: Vec<BatchConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgmentConfig {
    /// Evaluation API endpoint
    #[serde(default = "default_judgment_endpoint")]
    pub api_endpoint: String,
    /// Environment variable name for the evaluation API key
    #[serde(default = "default_judgment_env_var_api_key")]
    pub env_var_api_key: String,
    /// Environment variable name for the organization id
    #[serde(default = "default_judgment_env_var_org_id")]
    pub env_var_org_id: String,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_judgment_endpoint(),
            env_var_api_key: default_judgment_env_var_api_key(),
            env_var_org_id: default_judgment_env_var_org_id(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetTarget {
    /// JSON files in a local directory
    File,
    /// The evaluation service's dataset storage
    Judgment,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    pub target: DatasetTarget,
    /// Directory for the file target
    #[serde(default)]
    pub path: Option<String>,
    /// Replace a dataset saved earlier under the same alias
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

/// Configuration for a single batch
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Batch name, also the dataset alias
    pub name: String,
    /// Name of the evaluation run
    pub run_name: String,
    /// Scorers applied to every example of the batch
    pub scorers: Vec<ScorerKind>,
    /// Replace an earlier run with the same name instead of failing
    #[serde(default = "default_true")]
    pub override_existing_run: bool,
    /// Questions and their ground truth
    pub examples: Vec<ExampleSpec>,
}

fn default_api_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_env_var_api_key() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_concurrency() -> usize {
    1
}

fn default_prompt_label() -> String {
    "Question".to_string()
}

fn default_judgment_endpoint() -> String {
    "https://api.judgmentlabs.ai".to_string()
}

fn default_judgment_env_var_api_key() -> String {
    "JUDGMENT_API_KEY".to_string()
}

fn default_judgment_env_var_org_id() -> String {
    "JUDGMENT_ORG_ID".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;

        Ok(config)
    }

    /// Apply `SOLAR_EVAL_*` overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(project) = lookup("SOLAR_EVAL_PROJECT") {
            self.project_name = project;
        }
        if let Some(model) = lookup("SOLAR_EVAL_MODEL") {
            self.model = model;
        }
        if let Some(judge) = lookup("SOLAR_EVAL_JUDGE_MODEL") {
            self.judge_model = Some(judge);
        }

        for kind in ScorerKind::ALL {
            let key = format!("SOLAR_EVAL_THRESHOLD_{}", kind.as_str().to_uppercase());
            if let Some(raw) = lookup(&key) {
                let threshold: f64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} is not a number: {:?}", key, raw))?;
                self.thresholds.insert(kind.as_str().to_string(), threshold);
            }
        }

        Ok(())
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.batches.is_empty() {
            bail!("No batches configured");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        for (name, threshold) in &self.thresholds {
            let kind: ScorerKind = name.parse().map_err(anyhow::Error::msg)?;
            ScoringStrategy::new(kind, *threshold)?;
        }

        let mut run_names = HashSet::new();
        for batch in &self.batches {
            if batch.examples.is_empty() {
                bail!("Batch {:?} has no examples", batch.name);
            }
            if batch.scorers.is_empty() {
                bail!("Batch {:?} selects no scorers", batch.name);
            }
            if !run_names.insert(batch.run_name.as_str()) {
                bail!("Run name {:?} is used by more than one batch", batch.run_name);
            }
        }

        if let Some(dataset) = &self.dataset {
            if dataset.target == DatasetTarget::File && dataset.path.is_none() {
                bail!("Dataset target \"file\" requires a path");
            }
        }

        Ok(())
    }

    pub fn judge_model(&self) -> &str {
        self.judge_model.as_deref().unwrap_or(&self.model)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn threshold(&self, kind: ScorerKind) -> f64 {
        self.thresholds
            .get(kind.as_str())
            .copied()
            .unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Scoring strategies selected by a batch, with their configured thresholds
    pub fn strategies(&self, batch: &BatchConfig) -> Result<Vec<ScoringStrategy>> {
        batch
            .scorers
            .iter()
            .map(|kind| {
                ScoringStrategy::new(*kind, self.threshold(*kind)).map_err(anyhow::Error::from)
            })
            .collect()
    }
}
