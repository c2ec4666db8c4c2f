use rand::Rng;

use crate::candidate::rank_order;
use crate::Candidate;

/// Number of elites carried over: `ceil(population_size * fraction)`, at most the population size
pub fn elite_count(population_size: usize, fraction: f64) -> usize {
    let raw = (population_size as f64 * fraction - 1e-9).ceil();
    (raw.max(0.0) as usize).min(population_size)
}

/// The top `count` scored candidates, best first
pub fn select_elites(candidates: &[Candidate], count: usize) -> Vec<&Candidate> {
    let mut ranked: Vec<&Candidate> = candidates.iter().filter(|c| c.is_scored()).collect();
    ranked.sort_by(|a, b| rank_order(a, b));
    ranked.truncate(count);
    ranked
}

/// Tournament selection with replacement over the scored members.
///
/// Falls back to the whole population when nothing is scored. Returns `None`
/// only for an empty population.
pub fn tournament_select<'a, R>(
    candidates: &'a [Candidate],
    tournament_size: usize,
    rng: &mut R,
) -> Option<&'a Candidate>
where
    R: Rng + ?Sized,
{
    let scored: Vec<&Candidate> = candidates.iter().filter(|c| c.is_scored()).collect();
    let pool: Vec<&Candidate> = if scored.is_empty() {
        candidates.iter().collect()
    } else {
        scored
    };
    if pool.is_empty() {
        return None;
    }

    let mut best = pool[rng.random_range(0..pool.len())];
    for _ in 1..tournament_size.max(1) {
        let challenger = pool[rng.random_range(0..pool.len())];
        if rank_order(challenger, best).is_lt() {
            best = challenger;
        }
    }
    Some(best)
}
