use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

mod batch;
mod config;
mod dataset;
mod error;
mod evaluation;
mod example_builder;
mod generation;
mod instrument;
mod judgment;
mod logging;
mod models;
mod output;
mod prompt;
mod runner;
mod statistics;
#[cfg(test)]
mod test_support;

use crate::batch::BatchRunner;
use crate::config::{Config, DatasetTarget};
use crate::dataset::{DatasetStore, FileDatasetStore};
use crate::evaluation::Evaluator;
use crate::example_builder::ExampleBuilder;
use crate::generation::{AnswerGenerator, ChatModel, OpenAiChatModel};
use crate::instrument::Traced;
use crate::judgment::{JudgmentClient, JudgmentDatasets};
use crate::logging::LogFormat;
use crate::output::OutputFormat;
use crate::prompt::PromptFormatter;
use crate::runner::Runner;

/// Solar-system evaluation CLI - ask a model the configured questions and score its answers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML run file
    run_file: PathBuf,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log every remote call
    #[arg(short, long)]
    verbose: bool,

    /// Log format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::default())]
    log_format: LogFormat,

    /// Only run the named batch (name or run name); repeatable
    #[arg(short, long = "batch")]
    batches: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init_logging(logging::default_level(args.verbose), args.log_format);

    let config = Config::from_file(&args.run_file)?;
    let runner = build_runner(config)?;

    let runs = runner.run_batches(&args.batches).await?;

    output::print_results(&runs, args.output);

    Ok(())
}

/// Wire the production collaborators described by `config`
fn build_runner(config: Config) -> anyhow::Result<Runner> {
    let openai = OpenAiChatModel::from_config(&config)?;
    let chat: Arc<dyn ChatModel> = if config.trace_calls {
        Arc::new(Traced::new(openai, "llm"))
    } else {
        Arc::new(openai)
    };
    let generator =
        AnswerGenerator::new(chat, config.model.clone()).with_timeout(config.request_timeout());
    let formatter = PromptFormatter::new(config.prompt_label.clone());
    let builder = ExampleBuilder::new(formatter, generator);

    let judgment = JudgmentClient::from_config(&config)?;
    let evaluator: Arc<dyn Evaluator> = if config.trace_calls {
        Arc::new(Traced::new(judgment.clone(), "evaluation"))
    } else {
        Arc::new(judgment.clone())
    };
    let batch_runner = BatchRunner::new(evaluator, config.project_name.clone());

    let dataset_store: Option<Arc<dyn DatasetStore>> = match &config.dataset {
        None => None,
        Some(dataset) => match dataset.target {
            DatasetTarget::File => {
                let Some(path) = &dataset.path else {
                    bail!("Dataset target \"file\" requires a path");
                };
                Some(Arc::new(FileDatasetStore::new(
                    path,
                    config.project_name.clone(),
                    dataset.overwrite,
                )) as Arc<dyn DatasetStore>)
            }
            DatasetTarget::Judgment => Some(Arc::new(JudgmentDatasets::new(
                judgment,
                config.project_name.clone(),
                dataset.overwrite,
            )) as Arc<dyn DatasetStore>),
        },
    };

    let runner = Runner::new(config, builder, batch_runner);
    Ok(match dataset_store {
        Some(store) => runner.with_dataset_store(store),
        None => runner,
    })
}
