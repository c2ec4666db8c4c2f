use promptevo_fitness::{total_weight, CriterionKind, EvaluationCriterion, PromptTemplate, TestCase};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Tolerance on the criterion weight sum
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Invalid run configuration, reported before any evaluation happens
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Base prompt is empty")]
    EmptyBasePrompt,

    #[error("At least one test case is required")]
    NoTestCases,

    #[error("At least one evaluation criterion is required")]
    NoCriteria,

    #[error("Duplicate test case id '{0}'")]
    DuplicateTestCase(String),

    #[error("Duplicate criterion name '{0}'")]
    DuplicateCriterion(String),

    #[error("Criterion '{name}' has invalid weight {weight}")]
    InvalidWeight { name: String, weight: f64 },

    #[error("Criterion weights sum to {0}, expected 1.0")]
    WeightSum(f64),

    #[error("Criterion '{0}' has no judge dimensions")]
    NoDimensions(String),

    #[error("Population size must be at least 1")]
    InvalidPopulationSize,

    #[error("Tournament size must be at least 1")]
    InvalidTournamentSize,

    #[error("Evaluation concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be positive and within range, got {value}")]
    InvalidBudget { name: &'static str, value: f64 },
}

/// Search parameters for one optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub max_generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elitism_fraction: f64,
    /// Generations without meaningful improvement before stopping
    pub max_stagnation: usize,
    pub target_score: f64,
    /// Minimum gain over the previous best that counts as improvement
    pub improvement_threshold: f64,
    pub tournament_size: usize,
    /// Total evaluation cost allowed for the run
    pub cost_budget: Option<f64>,
    /// Wall-clock allowance in seconds
    pub time_budget_secs: Option<f64>,
    pub seed: Option<u64>,
    /// Candidates evaluated at once within a generation
    pub evaluation_concurrency: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            max_generations: 10,
            mutation_rate: 0.3,
            crossover_rate: 0.7,
            elitism_fraction: 0.2,
            max_stagnation: 3,
            target_score: 0.95,
            improvement_threshold: 0.02,
            tournament_size: 3,
            cost_budget: None,
            time_budget_secs: None,
            seed: None,
            evaluation_concurrency: 1,
        }
    }
}

impl OptimizerConfig {
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    pub fn with_max_generations(mut self, max: usize) -> Self {
        self.max_generations = max;
        self
    }

    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate;
        self
    }

    pub fn with_elitism_fraction(mut self, fraction: f64) -> Self {
        self.elitism_fraction = fraction;
        self
    }

    pub fn with_max_stagnation(mut self, max: usize) -> Self {
        self.max_stagnation = max;
        self
    }

    pub fn with_target_score(mut self, target: f64) -> Self {
        self.target_score = target;
        self
    }

    pub fn with_improvement_threshold(mut self, threshold: f64) -> Self {
        self.improvement_threshold = threshold;
        self
    }

    pub fn with_tournament_size(mut self, size: usize) -> Self {
        self.tournament_size = size;
        self
    }

    pub fn with_cost_budget(mut self, budget: f64) -> Self {
        self.cost_budget = Some(budget);
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_secs = Some(budget.as_secs_f64());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_evaluation_concurrency(mut self, concurrency: usize) -> Self {
        self.evaluation_concurrency = concurrency;
        self
    }

    /// Wall-clock budget; `None` when unset or not representable as a `Duration`
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::InvalidPopulationSize);
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::InvalidTournamentSize);
        }
        if self.evaluation_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        for (name, value) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
            ("elitism_fraction", self.elitism_fraction),
            ("target_score", self.target_score),
            ("improvement_threshold", self.improvement_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("cost_budget", self.cost_budget),
            ("time_budget_secs", self.time_budget_secs),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(ConfigError::InvalidBudget { name, value });
                }
            }
        }
        if let Some(value) = self.time_budget_secs {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidBudget {
                    name: "time_budget_secs",
                    value,
                });
            }
        }
        Ok(())
    }
}

/// What to optimize: the starting prompt, the cases it is tested on and how it is scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub base_prompt: PromptTemplate,
    pub test_cases: Vec<TestCase>,
    pub criteria: Vec<EvaluationCriterion>,
}

impl OptimizationRequest {
    pub fn new(
        base_prompt: PromptTemplate,
        test_cases: Vec<TestCase>,
        criteria: Vec<EvaluationCriterion>,
    ) -> Self {
        Self {
            base_prompt,
            test_cases,
            criteria,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_prompt.is_empty() {
            return Err(ConfigError::EmptyBasePrompt);
        }
        if self.test_cases.is_empty() {
            return Err(ConfigError::NoTestCases);
        }
        if self.criteria.is_empty() {
            return Err(ConfigError::NoCriteria);
        }

        let mut case_ids = HashSet::new();
        for case in &self.test_cases {
            if !case_ids.insert(case.id.as_str()) {
                return Err(ConfigError::DuplicateTestCase(case.id.clone()));
            }
        }

        let mut names = HashSet::new();
        for criterion in &self.criteria {
            if !names.insert(criterion.name.as_str()) {
                return Err(ConfigError::DuplicateCriterion(criterion.name.clone()));
            }
            if !criterion.weight.is_finite() || criterion.weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    name: criterion.name.clone(),
                    weight: criterion.weight,
                });
            }
            if let CriterionKind::LlmJudged { dimensions, .. } = &criterion.kind {
                if dimensions.is_empty() {
                    return Err(ConfigError::NoDimensions(criterion.name.clone()));
                }
            }
        }

        let sum = total_weight(&self.criteria);
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightSum(sum));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(weights: &[f64]) -> OptimizationRequest {
        OptimizationRequest::new(
            PromptTemplate::single("Answer the question."),
            vec![TestCase::new("q1", "What is the refund window?")],
            weights
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    EvaluationCriterion::new(format!("c{}", i), *w, CriterionKind::retrieval_f1())
                })
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default();
        assert_eq!(config.population_size, 10);
        assert_eq!(config.tournament_size, 3);
        assert_eq!(config.evaluation_concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        assert!(request(&[0.4, 0.6]).validate().is_ok());
        assert!(request(&[0.3333333, 0.3333333, 0.3333334]).validate().is_ok());
        assert!(matches!(
            request(&[0.4, 0.4]).validate(),
            Err(ConfigError::WeightSum(sum)) if (sum - 0.8).abs() < 1e-9
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        assert!(matches!(
            request(&[1.5, -0.5]).validate(),
            Err(ConfigError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_duplicate_criterion_rejected() {
        let mut req = request(&[0.5, 0.5]);
        req.criteria[1].name = "c0".to_string();
        assert_eq!(
            req.validate(),
            Err(ConfigError::DuplicateCriterion("c0".to_string()))
        );
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let mut req = request(&[1.0]);
        req.base_prompt = PromptTemplate::single("   ");
        assert_eq!(req.validate(), Err(ConfigError::EmptyBasePrompt));

        let mut req = request(&[1.0]);
        req.test_cases.clear();
        assert_eq!(req.validate(), Err(ConfigError::NoTestCases));

        assert_eq!(request(&[]).validate(), Err(ConfigError::NoCriteria));
    }

    #[test]
    fn test_rates_out_of_range_rejected() {
        let config = OptimizerConfig::default().with_mutation_rate(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "mutation_rate", .. })
        ));
        assert_eq!(
            OptimizerConfig::default().with_population_size(0).validate(),
            Err(ConfigError::InvalidPopulationSize)
        );
        assert_eq!(
            OptimizerConfig::default().with_tournament_size(0).validate(),
            Err(ConfigError::InvalidTournamentSize)
        );
    }

    #[test]
    fn test_unrepresentable_time_budget_rejected() {
        let config = OptimizerConfig {
            time_budget_secs: Some(1e20),
            ..OptimizerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBudget {
                name: "time_budget_secs",
                ..
            })
        ));
        assert_eq!(config.time_budget(), None);

        let config = OptimizerConfig {
            time_budget_secs: Some(90.5),
            ..OptimizerConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.time_budget(), Some(Duration::from_secs_f64(90.5)));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: OptimizerConfig =
            serde_json::from_str(r#"{"population_size": 4, "seed": 7}"#).unwrap();
        assert_eq!(config.population_size, 4);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_generations, 10);
    }
}
