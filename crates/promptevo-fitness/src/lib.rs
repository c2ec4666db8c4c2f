mod criteria;
pub mod evaluator;
mod metrics;
mod prompts;
pub mod scorer;
mod session;
pub mod template;
mod verdict;

pub use criteria::{total_weight, CriterionKind, EvaluationCriterion, RetrievalMetric, TestCase};
pub use evaluator::{
    combine_scores, FitnessEvaluator, FitnessOptions, FitnessReport, FitnessSubject,
    FAILURE_PENALTY,
};
pub use metrics::RetrievalScores;
pub use prompts::{JudgeInput, JudgePrompts};
pub use scorer::{CriterionScore, CriterionScorer, JudgeScorer, RetrievalScorer, ScorerError};
pub use session::{CostLedger, EvaluationSession};
pub use template::{PromptComponent, PromptTemplate};
pub use verdict::{JudgeVerdict, VerdictSource, NEUTRAL_SCORE};
