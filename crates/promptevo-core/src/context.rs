use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::population::{GenerationStats, IdAllocator};
use crate::{Candidate, CandidateId, ConvergenceState, Population};

/// Mutable bookkeeping for one optimization run
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    /// Generation currently being evaluated
    pub generation: usize,
    /// One record per evaluated generation
    pub history: Vec<GenerationRecord>,
    pub ids: IdAllocator,
    pub stagnation_count: usize,
    pub total_cost: f64,
    /// Every candidate ever created, latest scored version
    archive: BTreeMap<CandidateId, Candidate>,
    best: Option<Candidate>,
    started_at: Instant,
}

/// Summary of one evaluated generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub best_score: f64,
    pub average_score: f64,
    pub worst_score: f64,
    pub best_candidate: Candidate,
    pub evaluated: usize,
    pub cumulative_cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            generation: 0,
            history: Vec::new(),
            ids: IdAllocator::new(),
            stagnation_count: 0,
            total_cost: 0.0,
            archive: BTreeMap::new(),
            best: None,
            started_at: Instant::now(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Store the current version of every member of `population`
    pub fn archive_population(&mut self, population: &Population) {
        for candidate in population.iter() {
            self.archive.insert(candidate.id, candidate.clone());
        }
    }

    pub fn archive_len(&self) -> usize {
        self.archive.len()
    }

    /// Take `candidate` as the new best if it scores strictly higher, so the
    /// earliest of equally scored candidates is kept.
    pub fn consider(&mut self, candidate: &Candidate) -> bool {
        if !candidate.is_scored() {
            return false;
        }
        let better = match &self.best {
            Some(best) => candidate.fitness() > best.fitness(),
            None => true,
        };
        if better {
            self.best = Some(candidate.clone());
        }
        better
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().and_then(|c| c.combined_score)
    }

    pub fn push_record(&mut self, stats: &GenerationStats, best_candidate: Candidate) {
        self.history.push(GenerationRecord {
            generation: self.generation,
            best_score: stats.best_score,
            average_score: stats.average_score,
            worst_score: stats.worst_score,
            best_candidate,
            evaluated: stats.evaluated,
            cumulative_cost: self.total_cost,
            timestamp: Utc::now(),
        });
    }

    pub fn convergence_state(&self) -> ConvergenceState {
        ConvergenceState {
            generation: self.generation,
            best_score: self.best_score().unwrap_or(0.0),
            stagnation_count: self.stagnation_count,
            total_cost: self.total_cost,
            elapsed: self.total_duration(),
        }
    }

    /// Hand the archive and best candidate over, ordered by id
    pub(crate) fn into_parts(self) -> (Vec<GenerationRecord>, Vec<Candidate>, Option<Candidate>) {
        (
            self.history,
            self.archive.into_values().collect(),
            self.best,
        )
    }
}
