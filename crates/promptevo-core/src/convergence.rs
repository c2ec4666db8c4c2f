use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::OptimizerConfig;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvergenceReason {
    TargetReached,
    BudgetExceeded,
    Stagnation,
    MaxGenerations,
    Interrupted,
}

impl ConvergenceReason {
    pub fn name(&self) -> &'static str {
        match self {
            ConvergenceReason::TargetReached => "target-reached",
            ConvergenceReason::BudgetExceeded => "budget-exceeded",
            ConvergenceReason::Stagnation => "stagnation",
            ConvergenceReason::MaxGenerations => "max-generations",
            ConvergenceReason::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a generation moved the search forward
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// The generation beat the previous best by more than the improvement threshold
    Improved { previous_best: Option<f64> },
    Stalled { previous_best: f64 },
}

/// Search state the stop conditions are checked against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceState {
    pub generation: usize,
    pub best_score: f64,
    pub stagnation_count: usize,
    pub total_cost: f64,
    pub elapsed: Duration,
}

/// Decides after each generation whether the search goes on
#[derive(Debug, Clone)]
pub struct ConvergenceController {
    target_score: f64,
    cost_budget: Option<f64>,
    time_budget: Option<Duration>,
    max_stagnation: usize,
    max_generations: usize,
    improvement_threshold: f64,
}

impl ConvergenceController {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            target_score: config.target_score,
            cost_budget: config.cost_budget,
            time_budget: config.time_budget(),
            max_stagnation: config.max_stagnation,
            max_generations: config.max_generations,
            improvement_threshold: config.improvement_threshold,
        }
    }

    /// Compare a generation's best against the best seen before it
    pub fn assess(&self, previous_best: Option<f64>, generation_best: f64) -> Progress {
        match previous_best {
            Some(previous) if generation_best <= previous + self.improvement_threshold => {
                Progress::Stalled {
                    previous_best: previous,
                }
            }
            previous_best => Progress::Improved { previous_best },
        }
    }

    /// The reason to stop, if any. Conditions are checked in order: target,
    /// budget, stagnation, generation limit. `max_stagnation == 0` disables
    /// the stagnation stop.
    pub fn should_stop(&self, state: &ConvergenceState) -> Option<ConvergenceReason> {
        if state.best_score >= self.target_score {
            return Some(ConvergenceReason::TargetReached);
        }
        let over_cost = self.cost_budget.is_some_and(|b| state.total_cost > b);
        let over_time = self.time_budget.is_some_and(|b| state.elapsed > b);
        if over_cost || over_time {
            return Some(ConvergenceReason::BudgetExceeded);
        }
        if self.max_stagnation > 0 && state.stagnation_count >= self.max_stagnation {
            return Some(ConvergenceReason::Stagnation);
        }
        if state.generation >= self.max_generations {
            return Some(ConvergenceReason::MaxGenerations);
        }
        None
    }
}
