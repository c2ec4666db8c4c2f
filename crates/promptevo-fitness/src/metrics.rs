use std::collections::HashSet;

use crate::RetrievalMetric;

/// Precision, recall and F1 of one retrieval against its expected chunk ids
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetrievalScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl RetrievalScores {
    /// Duplicate ids on either side count once
    pub fn compute<E, R>(expected: &[E], retrieved: &[R]) -> Self
    where
        E: AsRef<str>,
        R: AsRef<str>,
    {
        let expected: HashSet<&str> = expected.iter().map(AsRef::as_ref).collect();
        let retrieved: HashSet<&str> = retrieved.iter().map(AsRef::as_ref).collect();
        let hits = expected.intersection(&retrieved).count() as f64;

        let precision = if retrieved.is_empty() {
            0.0
        } else {
            hits / retrieved.len() as f64
        };
        let recall = if expected.is_empty() {
            0.0
        } else {
            hits / expected.len() as f64
        };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Self {
            precision,
            recall,
            f1,
        }
    }

    pub fn get(&self, metric: RetrievalMetric) -> f64 {
        match metric {
            RetrievalMetric::Precision => self.precision,
            RetrievalMetric::Recall => self.recall,
            RetrievalMetric::F1 => self.f1,
        }
    }
}
