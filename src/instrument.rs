use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{EvaluationServiceError, RemoteServiceError};
use crate::evaluation::{EvaluationRequest, Evaluator};
use crate::generation::ChatModel;
use crate::models::ScorerResult;

/// Wraps a collaborator and records a span for each call it serves
pub struct Traced<T> {
    inner: T,
    span_type: &'static str,
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl<T> Traced<T> {
    pub fn new(inner: T, span_type: &'static str) -> Self {
        Self {
            inner,
            span_type,
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    fn record<R, E: std::fmt::Display>(&self, started: Instant, outcome: &Result<R, E>) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(_) => debug!(span_type = self.span_type, elapsed_ms, "Call finished"),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(span_type = self.span_type, elapsed_ms, error = %e, "Call failed");
            }
        }
    }
}

impl<T> Drop for Traced<T> {
    fn drop(&mut self) {
        info!(
            span_type = self.span_type,
            calls = self.calls(),
            failures = self.failures(),
            "Traced call totals"
        );
    }
}

#[async_trait]
impl<T: ChatModel> ChatModel for Traced<T> {
    async fn complete(&self, model: &str, prompt: &str) -> Result<Vec<String>, RemoteServiceError> {
        let span = info_span!("llm", span_type = self.span_type, model);
        let started = Instant::now();
        let outcome = self.inner.complete(model, prompt).instrument(span).await;
        self.record(started, &outcome);
        outcome
    }
}

#[async_trait]
impl<T: Evaluator> Evaluator for Traced<T> {
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<Vec<Vec<ScorerResult>>, EvaluationServiceError> {
        let span = info_span!(
            "evaluation",
            span_type = self.span_type,
            run = %request.run_name,
            examples = request.examples.len()
        );
        let started = Instant::now();
        let outcome = self.inner.evaluate(request).instrument(span).await;
        self.record(started, &outcome);
        outcome
    }
}
