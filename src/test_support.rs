//! Stub collaborators shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{EvaluationServiceError, RemoteServiceError};
use crate::evaluation::{EvaluationRequest, Evaluator};
use crate::generation::ChatModel;
use crate::models::{Example, ScorerResult};

#[derive(Debug, Clone)]
pub enum StubReply {
    /// Always answer with this text
    Text(String),
    /// Return exactly these choices
    Choices(Vec<String>),
    /// Answer with the prompt itself
    Echo,
    /// Fail prompts containing the given text, echo the rest
    FailWhenContains(String),
    /// Fail every call as if the network were down
    NetworkFault,
}

pub struct StubChatModel {
    reply: StubReply,
    delay_ms: u64,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl StubChatModel {
    pub fn replying(reply: StubReply) -> Self {
        Self {
            reply,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn models(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

#[async_trait]
impl ChatModel for StubChatModel {
    async fn complete(&self, model: &str, prompt: &str) -> Result<Vec<String>, RemoteServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        match &self.reply {
            StubReply::Text(text) => Ok(vec![text.clone()]),
            StubReply::Choices(choices) => Ok(choices.clone()),
            StubReply::Echo => Ok(vec![prompt.to_string()]),
            StubReply::FailWhenContains(needle) if prompt.contains(needle.as_str()) => Err(
                RemoteServiceError::Network("connection reset by peer".to_string()),
            ),
            StubReply::FailWhenContains(_) => Ok(vec![prompt.to_string()]),
            StubReply::NetworkFault => Err(RemoteServiceError::Network(
                "connection reset by peer".to_string(),
            )),
        }
    }
}

/// In-memory evaluator that scores 1.0 when the answer mentions the expected output
/// and remembers run names per project
#[derive(Default)]
pub struct StubEvaluator {
    runs: Mutex<HashSet<(String, String)>>,
    calls: AtomicUsize,
    verdicts_per_example: Option<usize>,
    display_names: bool,
}

impl StubEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this many verdicts per example regardless of the scorers requested
    pub fn misaligned(verdicts_per_example: usize) -> Self {
        Self {
            verdicts_per_example: Some(verdicts_per_example),
            ..Self::default()
        }
    }

    /// Name verdicts like "Answer Correctness" instead of the wire name
    pub fn with_display_names() -> Self {
        Self {
            display_names: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn verdict_name(&self, kind: &str) -> String {
        if !self.display_names {
            return kind.to_string();
        }
        kind.split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn score(example: &Example) -> f64 {
        match &example.expected_output {
            Some(expected) => {
                let expected = serde_json::to_string(expected).unwrap_or_default();
                if expected.contains(example.actual_output.as_str()) {
                    1.0
                } else {
                    0.0
                }
            }
            None => 0.5,
        }
    }
}

#[async_trait]
impl Evaluator for StubEvaluator {
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<Vec<Vec<ScorerResult>>, EvaluationServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = (request.project_name.clone(), request.run_name.clone());
        let mut runs = self.runs.lock().unwrap();
        if runs.contains(&key) && !request.override_existing_run {
            return Err(EvaluationServiceError::RunExists {
                run_name: request.run_name.clone(),
                project_name: request.project_name.clone(),
            });
        }
        runs.insert(key);

        let per_example = self.verdicts_per_example.unwrap_or(request.scorers.len());
        Ok(request
            .examples
            .iter()
            .map(|example| {
                let score = Self::score(example);
                request
                    .scorers
                    .iter()
                    .cycle()
                    .take(per_example)
                    .map(|strategy| ScorerResult {
                        scorer: self.verdict_name(strategy.kind.as_str()),
                        threshold: strategy.threshold,
                        score: Some(score),
                        success: score >= strategy.threshold,
                        reason: None,
                    })
                    .collect()
            })
            .collect())
    }
}
