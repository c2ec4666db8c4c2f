use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Candidate, ConvergenceReason, GenerationRecord, OptimizerConfig, Population};

/// The finished search: configuration, per-generation history, the best
/// candidate ever found and why the run stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub run_id: String,
    pub config: OptimizerConfig,
    pub history: Vec<GenerationRecord>,
    pub best_candidate: Candidate,
    pub convergence_reason: ConvergenceReason,
    pub final_population: Population,
    /// Every candidate created during the run, ordered by id
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub archive: Vec<Candidate>,
    pub total_cost: f64,
    pub total_duration_secs: f64,
}

impl OptimizationRun {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        run_id: String,
        config: OptimizerConfig,
        history: Vec<GenerationRecord>,
        best_candidate: Candidate,
        convergence_reason: ConvergenceReason,
        final_population: Population,
        archive: Vec<Candidate>,
        total_cost: f64,
        duration: Duration,
    ) -> Self {
        Self {
            run_id,
            config,
            history,
            best_candidate,
            convergence_reason,
            final_population,
            archive,
            total_cost,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    /// Number of generations evaluated
    pub fn generations(&self) -> usize {
        self.history.len()
    }

    pub fn best_score(&self) -> f64 {
        self.best_candidate.combined_score.unwrap_or(0.0)
    }

    pub fn is_success(&self) -> bool {
        self.convergence_reason == ConvergenceReason::TargetReached
    }

    /// Drop the archive, e.g. before serializing a compact result
    pub fn without_archive(mut self) -> Self {
        self.archive.clear();
        self
    }

    pub fn exit_code(&self) -> i32 {
        match self.convergence_reason {
            ConvergenceReason::TargetReached => 0,
            ConvergenceReason::Interrupted => 130,
            ConvergenceReason::BudgetExceeded
            | ConvergenceReason::Stagnation
            | ConvergenceReason::MaxGenerations => 1,
        }
    }

    /// Human-readable multi-line report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Stopped after {} generation(s): {}",
                self.generations(),
                self.convergence_reason
            ),
            format!(
                "Best candidate {} (generation {}) scored {:.3}",
                self.best_candidate.id,
                self.best_candidate.generation,
                self.best_score()
            ),
        ];
        for (name, score) in &self.best_candidate.criterion_scores {
            lines.push(format!("  {}: {:.3}", name, score));
        }
        if !self.best_candidate.mutation_history.is_empty() {
            let names: Vec<&str> = self
                .best_candidate
                .mutation_history
                .iter()
                .map(|m| m.name())
                .collect();
            lines.push(format!("  mutations: {}", names.join(", ")));
        }
        if let (Some(first), Some(last)) = (self.history.first(), self.history.last()) {
            lines.push(format!(
                "Best score went from {:.3} to {:.3}",
                first.best_score, last.best_score
            ));
        }
        lines.push(format!(
            "Evaluated {} candidate(s), cost {:.4}, {:.1}s",
            self.archive.iter().filter(|c| c.is_scored()).count(),
            self.total_cost,
            self.total_duration_secs
        ));
        lines.join("\n")
    }
}
