use promptevo_fitness::{FitnessReport, FitnessSubject, PromptTemplate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::MutationKind;

/// Run-unique candidate identifier, allocated in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(u64);

impl CandidateId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Evaluation and variation bookkeeping attached to a candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    pub token_estimate: u32,
    pub evaluation_cost: f64,
    pub evaluation_latency_secs: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Criteria that received a penalty score because their scorer failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_criteria: Vec<String>,
    /// Rewrites that failed and left their slot unchanged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutation_fallbacks: Vec<MutationKind>,
    /// Spend on rewriter calls while this candidate was bred
    #[serde(default)]
    pub mutation_cost: f64,
}

/// One prompt variant in the search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub generation: usize,
    #[serde(rename = "components")]
    pub prompt: PromptTemplate,
    pub parent_ids: Vec<CandidateId>,
    pub mutation_history: Vec<MutationKind>,
    pub combined_score: Option<f64>,
    pub criterion_scores: BTreeMap<String, f64>,
    pub metadata: CandidateMetadata,
}

impl Candidate {
    pub fn new(id: CandidateId, generation: usize, prompt: PromptTemplate) -> Self {
        let token_estimate = prompt.token_estimate();
        Self {
            id,
            generation,
            prompt,
            parent_ids: Vec::new(),
            mutation_history: Vec::new(),
            combined_score: None,
            criterion_scores: BTreeMap::new(),
            metadata: CandidateMetadata {
                token_estimate,
                ..CandidateMetadata::default()
            },
        }
    }

    pub fn with_parents(mut self, parents: Vec<CandidateId>) -> Self {
        self.parent_ids = parents;
        self
    }

    pub fn is_scored(&self) -> bool {
        self.combined_score.is_some()
    }

    /// Score used for ranking; unscored candidates rank below every scored one
    pub fn fitness(&self) -> f64 {
        self.combined_score.unwrap_or(f64::NEG_INFINITY)
    }
}

/// Best-first ordering: higher combined score wins, ties go to the lower id
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.fitness()
        .partial_cmp(&a.fitness())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

impl FitnessSubject for Candidate {
    fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    fn is_scored(&self) -> bool {
        Candidate::is_scored(self)
    }

    fn apply_fitness(&mut self, report: &FitnessReport) {
        self.criterion_scores = report.criterion_scores.clone();
        self.combined_score = Some(report.combined_score);
        self.metadata.token_estimate = report.token_estimate;
        self.metadata.evaluation_cost = report.cost;
        self.metadata.evaluation_latency_secs = report.latency.as_secs_f64();
        self.metadata.warnings.extend(report.warnings.iter().cloned());
        self.metadata.degraded_criteria = report.degraded_criteria.clone();
    }
}
