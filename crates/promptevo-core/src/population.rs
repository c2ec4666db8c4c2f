use promptevo_fitness::PromptTemplate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::rank_order;
use crate::selection::{elite_count, select_elites, tournament_select};
use crate::variation::{crossover, Mutator};
use crate::{Candidate, CandidateId, OptimizerConfig};

/// Hands out run-unique candidate ids in creation order
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> CandidateId {
        let id = CandidateId::new(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far
    pub fn allocated(&self) -> u64 {
        self.next
    }
}

/// Score summary of an evaluated generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationStats {
    pub best_score: f64,
    pub average_score: f64,
    pub worst_score: f64,
    pub best_candidate_id: CandidateId,
    pub evaluated: usize,
}

/// The candidates of one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub generation: usize,
    pub candidates: Vec<Candidate>,
}

impl Population {
    pub fn new(generation: usize, candidates: Vec<Candidate>) -> Self {
        Self {
            generation,
            candidates,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn unscored(&self) -> usize {
        self.candidates.iter().filter(|c| !c.is_scored()).count()
    }

    /// Highest-scoring member, ties to the lowest id
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .filter(|c| c.is_scored())
            .min_by(|a, b| rank_order(a, b))
    }

    /// Scored members, best first
    pub fn ranked(&self) -> Vec<&Candidate> {
        select_elites(&self.candidates, self.candidates.len())
    }

    /// Rewrite spend of the members bred for this generation. Carried elites
    /// keep their original generation and are not counted again.
    pub fn variation_cost(&self) -> f64 {
        self.candidates
            .iter()
            .filter(|c| c.generation == self.generation)
            .map(|c| c.metadata.mutation_cost)
            .sum()
    }

    /// Best, average and worst combined score over the scored members
    pub fn stats(&self) -> Option<GenerationStats> {
        let best = self.best()?;
        let scores: Vec<f64> = self
            .candidates
            .iter()
            .filter_map(|c| c.combined_score)
            .collect();
        let worst = scores.iter().copied().fold(f64::INFINITY, f64::min);
        Some(GenerationStats {
            best_score: best.fitness(),
            average_score: scores.iter().sum::<f64>() / scores.len() as f64,
            worst_score: worst,
            best_candidate_id: best.id,
            evaluated: scores.len(),
        })
    }
}

/// Builds generation 0 and each successor generation
pub struct PopulationManager<'a> {
    config: &'a OptimizerConfig,
    mutator: &'a Mutator,
}

impl<'a> PopulationManager<'a> {
    pub fn new(config: &'a OptimizerConfig, mutator: &'a Mutator) -> Self {
        Self { config, mutator }
    }

    /// Generation 0: the unscored base plus `population_size - 1` variants
    /// of it, each mutated regardless of the configured mutation rate.
    pub async fn initialize<R>(
        &self,
        base: &PromptTemplate,
        ids: &mut IdAllocator,
        rng: &mut R,
    ) -> Population
    where
        R: Rng + ?Sized,
    {
        let base_candidate = Candidate::new(ids.allocate(), 0, base.clone());
        let base_id = base_candidate.id;
        let mut candidates = vec![base_candidate];

        while candidates.len() < self.config.population_size {
            let outcome = self.mutator.mutate(base, 1.0, rng).await;
            let mut variant =
                Candidate::new(ids.allocate(), 0, outcome.prompt).with_parents(vec![base_id]);
            variant.mutation_history = outcome.applied;
            variant.metadata.mutation_fallbacks = outcome.fallbacks;
            variant.metadata.mutation_cost = outcome.cost;
            candidates.push(variant);
        }

        debug!(size = candidates.len(), "Initialized generation 0");
        Population::new(0, candidates)
    }

    /// The next generation: elites carried verbatim, then offspring bred from
    /// tournament-selected parents until the population is full.
    pub async fn advance<R>(
        &self,
        current: &Population,
        ids: &mut IdAllocator,
        rng: &mut R,
    ) -> Population
    where
        R: Rng + ?Sized,
    {
        let size = self.config.population_size;
        let generation = current.generation + 1;
        let elites = elite_count(size, self.config.elitism_fraction);

        let mut next: Vec<Candidate> = select_elites(&current.candidates, elites)
            .into_iter()
            .cloned()
            .collect();
        let carried = next.len();

        while next.len() < size {
            let first = tournament_select(&current.candidates, self.config.tournament_size, rng);
            let second = tournament_select(&current.candidates, self.config.tournament_size, rng);
            let (Some(first), Some(second)) = (first, second) else {
                break;
            };
            let offspring = self.breed(first, second, generation, ids, rng).await;
            next.push(offspring);
        }

        debug!(
            generation,
            elites = carried,
            offspring = next.len() - carried,
            "Advanced population"
        );
        Population::new(generation, next)
    }

    async fn breed<R>(
        &self,
        first: &Candidate,
        second: &Candidate,
        generation: usize,
        ids: &mut IdAllocator,
        rng: &mut R,
    ) -> Candidate
    where
        R: Rng + ?Sized,
    {
        let crossed = first.id != second.id && rng.random_bool(self.config.crossover_rate);
        let (prompt, parents) = if crossed {
            (
                crossover(&first.prompt, &second.prompt, rng),
                vec![first.id, second.id],
            )
        } else {
            (first.prompt.clone(), vec![first.id])
        };

        let outcome = self
            .mutator
            .mutate(&prompt, self.config.mutation_rate, rng)
            .await;
        let mut child = Candidate::new(ids.allocate(), generation, outcome.prompt)
            .with_parents(parents);
        child.mutation_history = outcome.applied;
        child.metadata.mutation_fallbacks = outcome.fallbacks;
        child.metadata.mutation_cost = outcome.cost;
        child
    }
}
