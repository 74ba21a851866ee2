use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EvalError;

/// Ground truth a scorer compares the actual answer against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedOutput {
    /// A single reference answer
    Single(String),
    /// Any of several acceptable answers
    AnyOf(Vec<String>),
}

impl ExpectedOutput {
    /// Whether at least one reference answer has non-blank text
    pub fn is_usable(&self) -> bool {
        match self {
            ExpectedOutput::Single(answer) => !answer.trim().is_empty(),
            ExpectedOutput::AnyOf(answers) => answers.iter().any(|a| !a.trim().is_empty()),
        }
    }
}

impl From<&str> for ExpectedOutput {
    fn from(value: &str) -> Self {
        ExpectedOutput::Single(value.to_string())
    }
}

impl From<String> for ExpectedOutput {
    fn from(value: String) -> Self {
        ExpectedOutput::Single(value)
    }
}

impl From<Vec<String>> for ExpectedOutput {
    fn from(value: Vec<String>) -> Self {
        ExpectedOutput::AnyOf(value)
    }
}

/// One evaluation record: a question, the model's answer, and ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// The question as asked
    pub input: String,
    /// Text generated by the model for `input`
    pub actual_output: String,
    /// Reference answer(s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<ExpectedOutput>,
    /// Supporting passages the answer should be faithful to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_context: Option<Vec<String>>,
}

impl Example {
    /// Whether the example carries the given ground-truth field with usable content.
    ///
    /// Empty lists and blank strings count as missing.
    pub fn has(&self, field: GroundTruthField) -> bool {
        match field {
            GroundTruthField::ExpectedOutput => self
                .expected_output
                .as_ref()
                .is_some_and(ExpectedOutput::is_usable),
            GroundTruthField::RetrievalContext => self
                .retrieval_context
                .as_ref()
                .is_some_and(|passages| passages.iter().any(|p| !p.trim().is_empty())),
        }
    }
}

/// A question and its ground truth, before the model has answered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleSpec {
    pub input: String,
    #[serde(default)]
    pub expected_output: Option<ExpectedOutput>,
    #[serde(default)]
    pub retrieval_context: Option<Vec<String>>,
}

/// A themed, ordered group of examples scored together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Name of the batch, also used as its dataset alias
    pub name: String,
    pub examples: Vec<Example>,
}

impl Batch {
    pub fn new(name: impl Into<String>, examples: Vec<Example>) -> Self {
        Self {
            name: name.into(),
            examples,
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundTruthField {
    ExpectedOutput,
    RetrievalContext,
}

impl fmt::Display for GroundTruthField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroundTruthField::ExpectedOutput => f.write_str("expected_output"),
            GroundTruthField::RetrievalContext => f.write_str("retrieval_context"),
        }
    }
}

/// Scoring metrics computed by the evaluation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    AnswerCorrectness,
    Faithfulness,
    AnswerRelevancy,
    ContextualRelevancy,
}

impl ScorerKind {
    pub const ALL: [ScorerKind; 4] = [
        ScorerKind::AnswerCorrectness,
        ScorerKind::Faithfulness,
        ScorerKind::AnswerRelevancy,
        ScorerKind::ContextualRelevancy,
    ];

    /// Wire name understood by the evaluation service
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::AnswerCorrectness => "answer_correctness",
            ScorerKind::Faithfulness => "faithfulness",
            ScorerKind::AnswerRelevancy => "answer_relevancy",
            ScorerKind::ContextualRelevancy => "contextual_relevancy",
        }
    }

    /// Ground-truth field every example must carry for this scorer
    pub fn required_field(&self) -> Option<GroundTruthField> {
        match self {
            ScorerKind::AnswerCorrectness => Some(GroundTruthField::ExpectedOutput),
            ScorerKind::Faithfulness | ScorerKind::ContextualRelevancy => {
                Some(GroundTruthField::RetrievalContext)
            }
            ScorerKind::AnswerRelevancy => None,
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScorerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScorerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown scorer {:?}", s))
    }
}

/// A scorer together with its pass/fail threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringStrategy {
    pub kind: ScorerKind,
    pub threshold: f64,
}

impl ScoringStrategy {
    /// Create a strategy, rejecting thresholds outside [0, 1]
    pub fn new(kind: ScorerKind, threshold: f64) -> Result<Self, EvalError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EvalError::InvalidThreshold {
                scorer: kind,
                threshold,
            });
        }
        Ok(Self { kind, threshold })
    }
}

/// Verdict of one scorer on one example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerResult {
    pub scorer: String,
    pub threshold: f64,
    pub score: Option<f64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// An example and every verdict recorded for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleResult {
    pub example: Example,
    pub scores: Vec<ScorerResult>,
}

impl ExampleResult {
    pub fn passed(&self) -> bool {
        self.scores.iter().all(|s| s.success)
    }
}

/// Statistics calculated per scorer across a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Mean score for each scorer
    pub mean: BTreeMap<String, f64>,
    /// Median score for each scorer
    pub median: BTreeMap<String, f64>,
    /// Mode score for each scorer (most frequent score)
    pub mode: BTreeMap<String, f64>,
    /// Fraction of examples that passed each scorer
    pub pass_rate: BTreeMap<String, f64>,
}

/// Result of scoring one batch under a run name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_name: String,
    pub project_name: String,
    pub results: Vec<ExampleResult>,
    pub statistics: Statistics,
}

impl EvaluationRun {
    /// Number of (example, scorer) verdicts in the run
    pub fn entry_count(&self) -> usize {
        self.results.iter().map(|r| r.scores.len()).sum()
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(ExampleResult::passed)
    }
}

/// Where a saved batch ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHandle {
    pub alias: String,
    pub project_name: String,
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scorer_kind_parses_wire_names() {
        for kind in ScorerKind::ALL {
            assert_eq!(kind.as_str().parse::<ScorerKind>(), Ok(kind));
        }
        assert!("bleu".parse::<ScorerKind>().is_err());
    }

    #[test]
    fn scorer_required_fields() {
        assert_eq!(
            ScorerKind::AnswerCorrectness.required_field(),
            Some(GroundTruthField::ExpectedOutput)
        );
        assert_eq!(
            ScorerKind::Faithfulness.required_field(),
            Some(GroundTruthField::RetrievalContext)
        );
        assert_eq!(ScorerKind::AnswerRelevancy.required_field(), None);
    }

    #[test]
    fn scoring_strategy_rejects_out_of_range_threshold() {
        assert!(ScoringStrategy::new(ScorerKind::Faithfulness, 0.0).is_ok());
        assert!(ScoringStrategy::new(ScorerKind::Faithfulness, 1.0).is_ok());
        assert!(matches!(
            ScoringStrategy::new(ScorerKind::Faithfulness, 1.2),
            Err(EvalError::InvalidThreshold { .. })
        ));
        assert!(ScoringStrategy::new(ScorerKind::Faithfulness, f64::NAN).is_err());
    }

    #[test]
    fn expected_output_serializes_untagged() {
        let single = ExpectedOutput::from("Mars has two moons.");
        let many = ExpectedOutput::from(vec!["No".to_string(), "None".to_string()]);
        assert_eq!(serde_json::to_value(&single).unwrap(), json!("Mars has two moons."));
        assert_eq!(serde_json::to_value(&many).unwrap(), json!(["No", "None"]));
    }

    #[test]
    fn example_omits_absent_ground_truth() {
        let example = Example {
            input: "Does Mars have an atmosphere?".into(),
            actual_output: "Yes, a thin one.".into(),
            expected_output: None,
            retrieval_context: Some(vec!["Mars has a very thin atmosphere".into()]),
        };
        let value = serde_json::to_value(&example).unwrap();
        assert!(value.get("expected_output").is_none());
        assert_eq!(value["retrieval_context"][0], "Mars has a very thin atmosphere");
        assert!(example.has(GroundTruthField::RetrievalContext));
        assert!(!example.has(GroundTruthField::ExpectedOutput));
    }

    #[test]
    fn empty_ground_truth_counts_as_missing() {
        let mut example = Example {
            input: "Is there life on Mars?".into(),
            actual_output: "Not that we know of.".into(),
            expected_output: Some(ExpectedOutput::from("   ")),
            retrieval_context: Some(vec![]),
        };
        assert!(!example.has(GroundTruthField::ExpectedOutput));
        assert!(!example.has(GroundTruthField::RetrievalContext));

        example.expected_output = Some(ExpectedOutput::AnyOf(vec![]));
        example.retrieval_context = Some(vec!["".into()]);
        assert!(!example.has(GroundTruthField::ExpectedOutput));
        assert!(!example.has(GroundTruthField::RetrievalContext));

        example.expected_output = Some(ExpectedOutput::AnyOf(vec!["".into(), "No.".into()]));
        assert!(example.has(GroundTruthField::ExpectedOutput));
    }
}
