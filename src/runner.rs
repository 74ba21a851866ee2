use crate::batch::BatchRunner;
use crate::config::{BatchConfig, Config};
use crate::dataset::DatasetStore;
use crate::example_builder::ExampleBuilder;
use crate::models::EvaluationRun;
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::info;

/// Main runner that drives every configured batch through generation and scoring
pub struct Runner {
    config: Config,
    builder: ExampleBuilder,
    batch_runner: BatchRunner,
    dataset_store: Option<Arc<dyn DatasetStore>>,
}

impl Runner {
    pub fn new(config: Config, builder: ExampleBuilder, batch_runner: BatchRunner) -> Self {
        Self {
            config,
            builder,
            batch_runner,
            dataset_store: None,
        }
    }

    /// Save every batch through `store` before it is scored
    pub fn with_dataset_store(mut self, store: Arc<dyn DatasetStore>) -> Self {
        self.dataset_store = Some(store);
        self
    }

    /// Run the batches named in `filter`, or all of them when it is empty.
    ///
    /// Stops at the first failing batch; runs finished before it are discarded.
    pub async fn run_batches(&self, filter: &[String]) -> Result<Vec<EvaluationRun>> {
        let selected = self.select(filter)?;
        let total_batches = selected.len();
        let mut runs = Vec::with_capacity(total_batches);

        for (batch_index, batch_config) in selected.into_iter().enumerate() {
            let run = self
                .run_single_batch(batch_config, batch_index + 1, total_batches)
                .await
                .with_context(|| format!("Batch {:?} failed", batch_config.name))?;
            runs.push(run);
        }

        Ok(runs)
    }

    /// Batches matching `filter` by name or run name, in configuration order
    fn select(&self, filter: &[String]) -> Result<Vec<&BatchConfig>> {
        if filter.is_empty() {
            return Ok(self.config.batches.iter().collect());
        }

        if let Some(unknown) = filter.iter().find(|wanted| {
            !self
                .config
                .batches
                .iter()
                .any(|b| &b.name == *wanted || &b.run_name == *wanted)
        }) {
            bail!("No batch named {:?} in the run file", unknown);
        }

        Ok(self
            .config
            .batches
            .iter()
            .filter(|b| filter.iter().any(|wanted| wanted == &b.name || wanted == &b.run_name))
            .collect())
    }

    async fn run_single_batch(
        &self,
        batch_config: &BatchConfig,
        batch_num: usize,
        total_batches: usize,
    ) -> Result<EvaluationRun> {
        info!(
            "Building batch {}/{}: {} ({} questions)",
            batch_num,
            total_batches,
            batch_config.name,
            batch_config.examples.len()
        );

        let batch = self
            .builder
            .build_batch(&batch_config.name, &batch_config.examples, self.config.concurrency)
            .await
            .context("Failed to generate answers")?;

        if let Some(store) = &self.dataset_store {
            let handle = store.save(&batch).await.context("Failed to save dataset")?;
            info!(
                alias = %handle.alias,
                location = %handle.location,
                "Saved batch {}/{}",
                batch_num,
                total_batches
            );
        }

        let scorers = self.config.strategies(batch_config)?;

        info!("Scoring batch {}/{} as run {:?}", batch_num, total_batches, batch_config.run_name);

        let run = self
            .batch_runner
            .run(
                batch,
                &batch_config.run_name,
                &scorers,
                self.config.judge_model(),
                batch_config.override_existing_run,
            )
            .await
            .context("Failed to score batch")?;

        info!(
            run = %run.run_name,
            entries = run.entry_count(),
            all_passed = run.all_passed(),
            "Finished batch {}/{}",
            batch_num,
            total_batches
        );

        Ok(run)
    }
}
