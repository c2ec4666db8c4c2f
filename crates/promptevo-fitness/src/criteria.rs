use serde::{Deserialize, Serialize};

/// A query plus the ground truth it is judged against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub id: String,
    pub query: String,
    /// Chunk ids a perfect retrieval returns; absent for qualitative-only cases
    #[serde(default)]
    pub expected_chunk_ids: Option<Vec<String>>,
    /// Reference answer or rubric notes for the judge
    #[serde(default)]
    pub reference: Option<String>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            expected_chunk_ids: None,
            reference: None,
        }
    }

    pub fn with_expected_chunks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_chunk_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn has_retrieval_truth(&self) -> bool {
        self.expected_chunk_ids.is_some()
    }
}

/// Which retrieval statistic a deterministic criterion reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMetric {
    Precision,
    Recall,
    #[default]
    F1,
}

fn default_dimensions() -> Vec<String> {
    ["relevance", "accuracy", "completeness", "clarity"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// How a criterion is scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriterionKind {
    /// Deterministic retrieval accuracy against expected chunk ids
    Retrieval {
        #[serde(default)]
        metric: RetrievalMetric,
    },
    /// Judge model scoring the generated response on rubric dimensions
    LlmJudged {
        #[serde(default = "default_dimensions")]
        dimensions: Vec<String>,
        /// Extra guidance placed in the judge prompt
        #[serde(default)]
        rubric: Option<String>,
    },
}

impl CriterionKind {
    pub fn retrieval_f1() -> Self {
        CriterionKind::Retrieval {
            metric: RetrievalMetric::F1,
        }
    }

    pub fn judged() -> Self {
        CriterionKind::LlmJudged {
            dimensions: default_dimensions(),
            rubric: None,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self, CriterionKind::Retrieval { .. })
    }
}

/// One weighted evaluation criterion, immutable for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriterion {
    pub name: String,
    pub weight: f64,
    #[serde(flatten)]
    pub kind: CriterionKind,
}

impl EvaluationCriterion {
    pub fn new(name: impl Into<String>, weight: f64, kind: CriterionKind) -> Self {
        Self {
            name: name.into(),
            weight,
            kind,
        }
    }
}

/// Sum of all criterion weights
pub fn total_weight(criteria: &[EvaluationCriterion]) -> f64 {
    criteria.iter().map(|c| c.weight).sum()
}
