use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress events emitted by the optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        run_id: String,
        population_size: usize,
        max_generations: usize,
        criteria: Vec<String>,
        test_cases: usize,
    },
    GenerationStart {
        generation: usize,
        population_size: usize,
        unscored: usize,
    },
    EvaluationProgress {
        generation: usize,
        candidate_id: u64,
        completed: usize,
        total: usize,
        combined_score: f64,
        /// Criteria that fell back to a penalty or neutral score
        #[serde(default)]
        degraded_criteria: Vec<String>,
    },
    GenerationCompleted {
        generation: usize,
        best_score: f64,
        average_score: f64,
        worst_score: f64,
        best_candidate_id: u64,
    },
    ImprovementFound {
        generation: usize,
        candidate_id: u64,
        previous_best: f64,
        new_best: f64,
    },
    Stagnation {
        generation: usize,
        stagnation_count: usize,
        max_stagnation: usize,
        best_score: f64,
    },
    Convergence {
        reason: String,
        generations: usize,
        best_score: f64,
        best_candidate_id: u64,
        total_cost: f64,
        duration_secs: f64,
    },
    Error {
        generation: usize,
        candidate_id: Option<u64>,
        message: String,
    },
}

impl ProgressEvent {
    /// Attach the emission timestamp
    pub fn stamp(self) -> StampedEvent {
        StampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }

    /// The wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::RunStarted { .. } => "run_started",
            ProgressEvent::GenerationStart { .. } => "generation_start",
            ProgressEvent::EvaluationProgress { .. } => "evaluation_progress",
            ProgressEvent::GenerationCompleted { .. } => "generation_completed",
            ProgressEvent::ImprovementFound { .. } => "improvement_found",
            ProgressEvent::Stagnation { .. } => "stagnation",
            ProgressEvent::Convergence { .. } => "convergence",
            ProgressEvent::Error { .. } => "error",
        }
    }
}

/// An event together with the time it was emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ProgressEvent,
}
