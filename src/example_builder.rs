use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::error::Result;
use crate::generation::AnswerGenerator;
use crate::models::{Batch, Example, ExampleSpec, ExpectedOutput};
use crate::prompt::PromptFormatter;

/// Builds evaluation records by asking the model each question once
#[derive(Clone)]
pub struct ExampleBuilder {
    formatter: PromptFormatter,
    generator: AnswerGenerator,
}

impl ExampleBuilder {
    pub fn new(formatter: PromptFormatter, generator: AnswerGenerator) -> Self {
        Self {
            formatter,
            generator,
        }
    }

    /// Ask the model `question` and pair its answer with the given ground truth.
    ///
    /// Every call is a fresh remote request; two calls with the same question
    /// may produce different answers.
    pub async fn build(
        &self,
        question: &str,
        expected_output: Option<ExpectedOutput>,
        retrieval_context: Option<Vec<String>>,
    ) -> Result<Example> {
        let prompt = self.formatter.format(question);
        let actual_output = self.generator.generate(&prompt).await?;

        debug!(question, answer = %actual_output, "Generated answer");

        Ok(Example {
            input: question.to_string(),
            actual_output,
            expected_output,
            retrieval_context,
        })
    }

    /// Build every example of a batch, keeping the order of `specs`.
    ///
    /// Up to `concurrency` answers are generated at once. A failed generation
    /// does not cancel the others, but the batch fails with the first error in
    /// spec order.
    pub async fn build_batch(
        &self,
        name: &str,
        specs: &[ExampleSpec],
        concurrency: usize,
    ) -> Result<Batch> {
        let total = specs.len();

        let outcomes: Vec<Result<Example>> = stream::iter(specs.iter().enumerate())
            .map(|(index, spec)| async move {
                debug!(batch = name, "Generating answer {}/{}", index + 1, total);
                self.build(
                    &spec.input,
                    spec.expected_output.clone(),
                    spec.retrieval_context.clone(),
                )
                .await
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let examples = outcomes.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(Batch::new(name, examples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EvalError, RemoteServiceError};
    use crate::test_support::{StubChatModel, StubReply};
    use std::sync::Arc;

    fn builder_with(stub: Arc<StubChatModel>) -> ExampleBuilder {
        ExampleBuilder::new(
            PromptFormatter::default(),
            AnswerGenerator::new(stub, "gpt-4.1"),
        )
    }

    fn spec(input: &str) -> ExampleSpec {
        ExampleSpec {
            input: input.to_string(),
            expected_output: None,
            retrieval_context: Some(vec![format!("context for {}", input)]),
        }
    }

    #[tokio::test]
    async fn test_build_pairs_answer_with_ground_truth() {
        let stub = Arc::new(StubChatModel::replying(StubReply::Text(
            "Mercury has zero moons.".into(),
        )));
        let builder = builder_with(stub.clone());

        let example = builder
            .build(
                "How many moons does Mercury have?",
                Some("Mercury has no moons.".into()),
                None,
            )
            .await
            .unwrap();

        assert_eq!(example.input, "How many moons does Mercury have?");
        assert_eq!(example.actual_output, "Mercury has zero moons.");
        assert_eq!(
            example.expected_output,
            Some(ExpectedOutput::Single("Mercury has no moons.".into()))
        );
        assert_eq!(example.retrieval_context, None);
        assert_eq!(
            stub.prompts(),
            vec!["Question : How many moons does Mercury have?".to_string()]
        );
    }

    #[tokio::test]
    async fn test_build_calls_model_every_time() {
        let stub = Arc::new(StubChatModel::replying(StubReply::Echo));
        let builder = builder_with(stub.clone());

        builder.build("Is there life on Mars?", None, None).await.unwrap();
        builder.build("Is there life on Mars?", None, None).await.unwrap();

        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_build_propagates_network_fault() {
        let stub = Arc::new(StubChatModel::replying(StubReply::NetworkFault));
        let builder = builder_with(stub);

        let result = builder.build("Does Mars have an atmosphere?", None, None).await;
        assert!(matches!(
            result,
            Err(EvalError::RemoteService(RemoteServiceError::Network(_)))
        ));
    }

    #[tokio::test]
    async fn test_build_batch_preserves_order_under_concurrency() {
        let stub = Arc::new(StubChatModel::replying(StubReply::Echo).with_delay_ms(10));
        let builder = builder_with(stub.clone());
        let specs: Vec<_> = ["Mercury", "Venus", "Earth", "Mars", "Jupiter"]
            .iter()
            .map(|planet| spec(&format!("How many moons does {} have?", planet)))
            .collect();

        let batch = builder.build_batch("moons_dataset", &specs, 3).await.unwrap();

        assert_eq!(batch.name, "moons_dataset");
        assert_eq!(batch.len(), 5);
        for (example, spec) in batch.examples.iter().zip(&specs) {
            assert_eq!(example.input, spec.input);
            assert_eq!(example.actual_output, format!("Question : {}", spec.input));
            assert_eq!(example.retrieval_context, spec.retrieval_context);
        }
        assert_eq!(stub.calls(), 5);
    }

    #[tokio::test]
    async fn test_build_batch_failure_does_not_cancel_siblings() {
        let stub = Arc::new(StubChatModel::replying(StubReply::FailWhenContains(
            "Venus".into(),
        )));
        let builder = builder_with(stub.clone());
        let specs = vec![spec("Mercury?"), spec("Venus?"), spec("Earth?")];

        let result = builder.build_batch("planets", &specs, 2).await;

        assert!(matches!(
            result,
            Err(EvalError::RemoteService(RemoteServiceError::Network(_)))
        ));
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn test_build_batch_sequential_by_default() {
        let stub = Arc::new(StubChatModel::replying(StubReply::Echo));
        let builder = builder_with(stub.clone());
        let specs = vec![spec("first"), spec("second")];

        builder.build_batch("seq", &specs, 1).await.unwrap();

        assert_eq!(
            stub.prompts(),
            vec!["Question : first".to_string(), "Question : second".to_string()]
        );
    }
}
