use promptevo_providers::{Generator, Retriever};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::scorer::{CriterionScorer, JudgeScorer, RetrievalScorer};
use crate::{CriterionKind, EvaluationCriterion, EvaluationSession, PromptTemplate, TestCase};

/// Score assigned to a criterion whose scorer failed outright
pub const FAILURE_PENALTY: f64 = 0.1;

/// Knobs for fitness evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitnessOptions {
    /// Documents retrieved per test case
    pub top_k: usize,
    pub response_temperature: f32,
    pub judge_temperature: f32,
    pub failure_penalty: f64,
    /// Fallback price for generations that report no cost
    pub cost_per_1k_tokens: Option<f64>,
}

impl Default for FitnessOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            response_temperature: 0.7,
            judge_temperature: 0.1,
            failure_penalty: FAILURE_PENALTY,
            cost_per_1k_tokens: None,
        }
    }
}

/// Something that carries a prompt and can hold fitness results
pub trait FitnessSubject {
    fn prompt(&self) -> &PromptTemplate;

    fn is_scored(&self) -> bool;

    fn apply_fitness(&mut self, report: &FitnessReport);
}

/// Everything one evaluation produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessReport {
    pub criterion_scores: BTreeMap<String, f64>,
    pub combined_score: f64,
    pub cost: f64,
    #[serde(with = "duration_secs")]
    pub latency: Duration,
    pub token_estimate: u32,
    pub external_calls: u32,
    pub warnings: Vec<String>,
    /// Criteria that failed and received the penalty score
    pub degraded_criteria: Vec<String>,
}

impl FitnessReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_criteria.is_empty()
    }
}

/// Weighted sum of criterion scores. Criteria missing from `scores` count as zero.
pub fn combine_scores(criteria: &[EvaluationCriterion], scores: &BTreeMap<String, f64>) -> f64 {
    criteria
        .iter()
        .map(|c| c.weight * scores.get(&c.name).copied().unwrap_or(0.0))
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

/// Hybrid evaluator: runs each criterion's scorer and folds the results into one combined score
pub struct FitnessEvaluator {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    judge: Arc<dyn Generator>,
    options: FitnessOptions,
}

impl FitnessEvaluator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        judge: Arc<dyn Generator>,
    ) -> Self {
        Self {
            retriever,
            generator,
            judge,
            options: FitnessOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FitnessOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &FitnessOptions {
        &self.options
    }

    /// Evaluate `subject` unless it already carries a score.
    ///
    /// Returns `None` without touching the subject or any collaborator when
    /// it was scored before.
    pub async fn evaluate<S>(
        &self,
        subject: &mut S,
        test_cases: &[TestCase],
        criteria: &[EvaluationCriterion],
    ) -> Option<FitnessReport>
    where
        S: FitnessSubject + ?Sized,
    {
        if subject.is_scored() {
            debug!("Skipping already scored candidate");
            return None;
        }
        let report = self
            .score_prompt(subject.prompt(), test_cases, criteria)
            .await;
        subject.apply_fitness(&report);
        Some(report)
    }

    /// Score one prompt against every criterion. Never fails: a criterion
    /// whose scorer errors receives the failure penalty and a warning.
    pub async fn score_prompt(
        &self,
        prompt: &PromptTemplate,
        test_cases: &[TestCase],
        criteria: &[EvaluationCriterion],
    ) -> FitnessReport {
        let started = Instant::now();
        let session = EvaluationSession::new(
            prompt,
            test_cases,
            self.retriever.as_ref(),
            self.generator.as_ref(),
            &self.options,
        );

        let mut criterion_scores = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut degraded_criteria = Vec::new();

        for criterion in criteria {
            let result = match &criterion.kind {
                CriterionKind::Retrieval { metric } => {
                    RetrievalScorer::new(*metric).score(&session).await
                }
                CriterionKind::LlmJudged { dimensions, rubric } => {
                    JudgeScorer::new(self.judge.as_ref(), dimensions, rubric.as_deref())
                        .score(&session)
                        .await
                }
            };

            let value = match result {
                Ok(score) => {
                    warnings.extend(
                        score
                            .warnings
                            .into_iter()
                            .map(|w| format!("{}: {}", criterion.name, w)),
                    );
                    score.value
                }
                Err(e) => {
                    warn!(
                        criterion = %criterion.name,
                        error = %e,
                        penalty = self.options.failure_penalty,
                        "Criterion scorer failed, applying penalty"
                    );
                    warnings.push(format!("{}: {}", criterion.name, e));
                    degraded_criteria.push(criterion.name.clone());
                    self.options.failure_penalty
                }
            };
            debug!(criterion = %criterion.name, score = value, "Criterion scored");
            criterion_scores.insert(criterion.name.clone(), value);
        }

        let combined_score = combine_scores(criteria, &criterion_scores);
        let ledger = session.ledger();
        let latency = started.elapsed();

        info!(
            combined_score,
            cost = ledger.cost,
            calls = ledger.calls,
            latency_secs = latency.as_secs_f64(),
            degraded = degraded_criteria.len(),
            "Evaluation completed"
        );

        FitnessReport {
            criterion_scores,
            combined_score,
            cost: ledger.cost,
            latency,
            token_estimate: prompt.token_estimate(),
            external_calls: ledger.calls,
            warnings,
            degraded_criteria,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
