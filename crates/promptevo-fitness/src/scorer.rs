use async_trait::async_trait;
use promptevo_providers::{GenerateOptions, Generator, LlmError, RetrievalError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::prompts::{JudgeInput, JudgePrompts};
use crate::{EvaluationSession, JudgeVerdict, RetrievalMetric, RetrievalScores};

/// An external call failed while scoring a criterion
#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}

/// One criterion's normalized score plus anything worth surfacing about how it was reached
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionScore {
    pub value: f64,
    pub warnings: Vec<String>,
}

impl CriterionScore {
    pub fn new(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Computes one criterion's score for the prompt under evaluation
#[async_trait]
pub trait CriterionScorer: Send + Sync {
    async fn score(&self, session: &EvaluationSession<'_>) -> Result<CriterionScore, ScorerError>;
}

/// Deterministic retrieval accuracy over the test cases that carry expected chunk ids
pub struct RetrievalScorer {
    metric: RetrievalMetric,
}

impl RetrievalScorer {
    pub fn new(metric: RetrievalMetric) -> Self {
        Self { metric }
    }
}

#[async_trait]
impl CriterionScorer for RetrievalScorer {
    async fn score(&self, session: &EvaluationSession<'_>) -> Result<CriterionScore, ScorerError> {
        let mut values = Vec::new();

        for (index, case) in session.test_cases().iter().enumerate() {
            let Some(expected) = case.expected_chunk_ids.as_deref() else {
                continue;
            };
            let documents = session.retrieve(index).await?;
            let retrieved: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
            let scores = RetrievalScores::compute(expected, retrieved.as_slice());
            debug!(
                case = %case.id,
                precision = scores.precision,
                recall = scores.recall,
                f1 = scores.f1,
                "Retrieval scored"
            );
            values.push(scores.get(self.metric));
        }

        if values.is_empty() {
            return Ok(CriterionScore::new(0.0)
                .with_warning("no test case carries expected chunk ids"));
        }
        Ok(CriterionScore::new(mean(&values)))
    }
}

/// Qualitative score from a judge model applying a rubric to the generated responses
pub struct JudgeScorer<'a> {
    judge: &'a dyn Generator,
    dimensions: &'a [String],
    rubric: Option<&'a str>,
}

impl<'a> JudgeScorer<'a> {
    pub fn new(judge: &'a dyn Generator, dimensions: &'a [String], rubric: Option<&'a str>) -> Self {
        Self {
            judge,
            dimensions,
            rubric,
        }
    }
}

#[async_trait]
impl CriterionScorer for JudgeScorer<'_> {
    async fn score(&self, session: &EvaluationSession<'_>) -> Result<CriterionScore, ScorerError> {
        let options =
            GenerateOptions::default().with_temperature(session.options().judge_temperature);
        let mut values = Vec::new();
        let mut warnings = Vec::new();

        for (index, case) in session.test_cases().iter().enumerate() {
            let response = session.respond(index).await?;
            let context = session.retrieve(index).await?;

            let prompt = JudgePrompts::build_judge_prompt(JudgeInput {
                query: &case.query,
                reference: case.reference.as_deref(),
                context,
                response,
                dimensions: self.dimensions,
                rubric: self.rubric,
            });
            let generation = self.judge.generate(&prompt, &options).await?;
            session.record(&generation);

            let verdict = JudgeVerdict::parse(&generation.text, self.dimensions);
            if verdict.is_neutral() {
                warn!(case = %case.id, "Judge output unparseable, using neutral score");
            }
            warnings.extend(
                verdict
                    .warnings
                    .iter()
                    .map(|w| format!("{}: {}", case.id, w)),
            );
            values.push(verdict.score());
        }

        let mut score = CriterionScore::new(mean(&values));
        score.warnings = warnings;
        Ok(score)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
