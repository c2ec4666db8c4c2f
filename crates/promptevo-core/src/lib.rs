//! # promptevo-core
//!
//! Genetic search over prompt variants.
//!
//! [`Optimizer::optimize`] initializes a population from the base prompt,
//! scores it with a [`promptevo_fitness::FitnessEvaluator`], and breeds new
//! generations through tournament selection, elitism, crossover and mutation
//! until a [`ConvergenceReason`] applies.

mod candidate;
mod config;
mod context;
mod convergence;
mod error;
mod optimizer;
mod outcome;
mod population;
mod selection;
mod variation;

pub use candidate::{rank_order, Candidate, CandidateId, CandidateMetadata};
pub use config::{ConfigError, OptimizationRequest, OptimizerConfig, WEIGHT_TOLERANCE};
pub use context::{GenerationRecord, RunContext};
pub use convergence::{ConvergenceController, ConvergenceReason, ConvergenceState, Progress};
pub use error::OptimizerError;
pub use optimizer::Optimizer;
pub use outcome::OptimizationRun;
pub use population::{GenerationStats, IdAllocator, Population, PopulationManager};
pub use selection::{elite_count, select_elites, tournament_select};
pub use variation::{crossover, split_sentences, MutationKind, MutationOutcome, Mutator};
