use futures::stream::{self, StreamExt};
use promptevo_fitness::{FitnessEvaluator, FitnessReport};
use promptevo_logging::{ProgressEvent, ProgressSink};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::convergence::Progress;
use crate::{
    Candidate, ConvergenceController, ConvergenceReason, Mutator, OptimizationRequest,
    OptimizationRun, OptimizerConfig, OptimizerError, Population, PopulationManager, RunContext,
};

/// Drives the generation loop: initialize, evaluate, record, check convergence, advance
pub struct Optimizer<'a> {
    evaluator: &'a FitnessEvaluator,
    mutator: Mutator,
    sink: Arc<dyn ProgressSink>,
    interrupted: Arc<AtomicBool>,
}

impl<'a> Optimizer<'a> {
    pub fn new(evaluator: &'a FitnessEvaluator, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            evaluator,
            mutator: Mutator::new(),
            sink,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_mutator(mut self, mutator: Mutator) -> Self {
        self.mutator = mutator;
        self
    }

    /// Get a handle to signal interruption. The generation in flight finishes
    /// and is recorded before the run stops.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    fn emit(&self, event: ProgressEvent) {
        self.sink.emit(&event.stamp());
    }

    /// Run the search until a stop condition or the interrupt handle fires
    pub async fn optimize(
        &self,
        request: &OptimizationRequest,
        config: &OptimizerConfig,
    ) -> Result<OptimizationRun, OptimizerError> {
        config.validate()?;
        request.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut context = RunContext::new(Uuid::new_v4().to_string());
        let controller = ConvergenceController::new(config);
        let manager = PopulationManager::new(config, &self.mutator);

        info!(
            run_id = %context.run_id,
            population_size = config.population_size,
            max_generations = config.max_generations,
            seed = ?config.seed,
            "Starting optimization"
        );
        self.emit(ProgressEvent::RunStarted {
            run_id: context.run_id.clone(),
            population_size: config.population_size,
            max_generations: config.max_generations,
            criteria: request.criteria.iter().map(|c| c.name.clone()).collect(),
            test_cases: request.test_cases.len(),
        });

        let mut population = manager
            .initialize(&request.base_prompt, &mut context.ids, &mut rng)
            .await;
        context.total_cost += population.variation_cost();

        loop {
            context.generation = population.generation;
            let generation = population.generation;
            self.emit(ProgressEvent::GenerationStart {
                generation,
                population_size: population.len(),
                unscored: population.unscored(),
            });

            self.evaluate_population(&mut population, request, config, &mut context)
                .await;
            context.archive_population(&population);

            let stats = population
                .stats()
                .ok_or(OptimizerError::EmptyPopulation(generation))?;
            let previous_best = context.best_score();
            for candidate in population.ranked() {
                context.consider(candidate);
            }

            match controller.assess(previous_best, stats.best_score) {
                Progress::Improved { previous_best } => {
                    context.stagnation_count = 0;
                    info!(generation, best = stats.best_score, "Improvement found");
                    self.emit(ProgressEvent::ImprovementFound {
                        generation,
                        candidate_id: stats.best_candidate_id.value(),
                        previous_best: previous_best.unwrap_or(0.0),
                        new_best: stats.best_score,
                    });
                }
                Progress::Stalled { previous_best } => {
                    context.stagnation_count += 1;
                    debug!(
                        generation,
                        previous_best,
                        stagnation = context.stagnation_count,
                        "No meaningful improvement"
                    );
                    self.emit(ProgressEvent::Stagnation {
                        generation,
                        stagnation_count: context.stagnation_count,
                        max_stagnation: config.max_stagnation,
                        best_score: context.best_score().unwrap_or(stats.best_score),
                    });
                }
            }

            let best_of_generation = population
                .best()
                .cloned()
                .ok_or(OptimizerError::EmptyPopulation(generation))?;
            context.push_record(&stats, best_of_generation);
            self.emit(ProgressEvent::GenerationCompleted {
                generation,
                best_score: stats.best_score,
                average_score: stats.average_score,
                worst_score: stats.worst_score,
                best_candidate_id: stats.best_candidate_id.value(),
            });

            if let Some(reason) = controller.should_stop(&context.convergence_state()) {
                return self.finish(context, population, config, reason);
            }

            if self.interrupted.load(Ordering::SeqCst) {
                info!(generation, "Optimization interrupted by user");
                return self.finish(context, population, config, ConvergenceReason::Interrupted);
            }

            population = manager
                .advance(&population, &mut context.ids, &mut rng)
                .await;
            context.total_cost += population.variation_cost();
            context.archive_population(&population);
        }
    }

    /// Score every unscored member through a bounded pool. Failures are
    /// absorbed by the evaluator, so every member comes back scored.
    async fn evaluate_population(
        &self,
        population: &mut Population,
        request: &OptimizationRequest,
        config: &OptimizerConfig,
        context: &mut RunContext,
    ) {
        let generation = population.generation;
        let pending: Vec<(usize, Candidate)> = population
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_scored())
            .map(|(index, c)| (index, c.clone()))
            .collect();
        let total = pending.len();
        if total == 0 {
            return;
        }

        let evaluator = self.evaluator;
        let test_cases = request.test_cases.as_slice();
        let criteria = request.criteria.as_slice();
        let mut results = stream::iter(pending.into_iter().map(move |(index, mut candidate)| async move {
            let report = evaluator.evaluate(&mut candidate, test_cases, criteria).await;
            (index, candidate, report)
        }))
        .buffer_unordered(config.evaluation_concurrency);

        let mut completed = 0;
        while let Some((index, candidate, report)) = results.next().await {
            completed += 1;
            if let Some(report) = &report {
                context.total_cost += report.cost;
                self.report_degradation(generation, &candidate, report);
            }
            debug!(
                generation,
                candidate = %candidate.id,
                score = ?candidate.combined_score,
                completed,
                total,
                "Candidate evaluated"
            );
            self.emit(ProgressEvent::EvaluationProgress {
                generation,
                candidate_id: candidate.id.value(),
                completed,
                total,
                combined_score: candidate.combined_score.unwrap_or(0.0),
                degraded_criteria: candidate.metadata.degraded_criteria.clone(),
            });
            population.candidates[index] = candidate;
        }
    }

    fn report_degradation(&self, generation: usize, candidate: &Candidate, report: &FitnessReport) {
        if !report.is_degraded() {
            return;
        }
        let message = format!(
            "criteria {} failed and received the penalty score",
            report.degraded_criteria.join(", ")
        );
        warn!(generation, candidate = %candidate.id, %message, "Degraded evaluation");
        self.emit(ProgressEvent::Error {
            generation,
            candidate_id: Some(candidate.id.value()),
            message,
        });
    }

    fn finish(
        &self,
        context: RunContext,
        population: Population,
        config: &OptimizerConfig,
        reason: ConvergenceReason,
    ) -> Result<OptimizationRun, OptimizerError> {
        let duration = context.total_duration();
        let run_id = context.run_id.clone();
        let total_cost = context.total_cost;
        let generation = context.generation;
        let (history, archive, best) = context.into_parts();
        let best = best.ok_or(OptimizerError::EmptyPopulation(generation))?;

        info!(
            run_id = %run_id,
            reason = %reason,
            generations = history.len(),
            best_score = ?best.combined_score,
            total_cost,
            "Optimization finished"
        );
        self.emit(ProgressEvent::Convergence {
            reason: reason.name().to_string(),
            generations: history.len(),
            best_score: best.combined_score.unwrap_or(0.0),
            best_candidate_id: best.id.value(),
            total_cost,
            duration_secs: duration.as_secs_f64(),
        });

        Ok(OptimizationRun::new(
            run_id,
            config.clone(),
            history,
            best,
            reason,
            population,
            archive,
            total_cost,
            duration,
        ))
    }
}
