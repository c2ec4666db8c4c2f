use async_trait::async_trait;
use promptevo_core::{
    ConfigError, ConvergenceReason, Mutator, OptimizationRequest, OptimizationRun, Optimizer,
    OptimizerConfig, OptimizerError,
};
use promptevo_fitness::{
    CriterionKind, EvaluationCriterion, FitnessEvaluator, PromptTemplate, TestCase,
};
use promptevo_logging::{ProgressEvent, ProgressSink, StampedEvent};
use promptevo_providers::{
    GenerateOptions, Generation, Generator, LlmError, RetrievalError, Retriever, ScoredDocument,
    Usage,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct StaticRetriever;

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<ScoredDocument>, RetrievalError> {
        Ok(["1", "2", "5"]
            .iter()
            .take(top_k)
            .map(|id| ScoredDocument {
                id: id.to_string(),
                score: 0.5,
                content: format!("Refunds are accepted within 30 days ({}).", id),
            })
            .collect())
    }
}

/// Echoes the rendered prompt back as the response
struct EchoGenerator {
    cost: f64,
    calls: AtomicUsize,
}

impl EchoGenerator {
    fn new(cost: f64) -> Arc<Self> {
        Arc::new(Self {
            cost,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str, _: &GenerateOptions) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(
            Generation::new(prompt.to_string(), Usage::estimate(prompt, prompt), Duration::ZERO)
                .with_cost(self.cost),
        )
    }
}

/// Returns the slot text from the end of a rewrite request, at a fixed price
struct PricedRewriter {
    cost: f64,
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for PricedRewriter {
    fn name(&self) -> &str {
        "priced-rewriter"
    }

    async fn generate(&self, prompt: &str, _: &GenerateOptions) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = prompt.rsplit("---\n").next().unwrap_or_default().to_string();
        Ok(
            Generation::new(text.clone(), Usage::estimate(prompt, &text), Duration::ZERO)
                .with_cost(self.cost),
        )
    }
}

enum JudgeMode {
    Constant(f64),
    /// Longer answers score higher
    Length,
    Broken,
    Failing,
}

struct FakeJudge {
    mode: JudgeMode,
}

#[async_trait]
impl Generator for FakeJudge {
    fn name(&self) -> &str {
        "judge"
    }

    async fn generate(&self, prompt: &str, _: &GenerateOptions) -> Result<Generation, LlmError> {
        let text = match self.mode {
            JudgeMode::Constant(score) => format!(r#"{{"relevance": {}}}"#, score),
            JudgeMode::Length => {
                let score = (prompt.len() as f64 / 6000.0).min(1.0);
                format!(r#"{{"relevance": {:.4}}}"#, score)
            }
            JudgeMode::Broken => "Looks reasonable overall.".to_string(),
            JudgeMode::Failing => return Err(LlmError::Server("judge unavailable".to_string())),
        };
        Ok(Generation::new(
            text.clone(),
            Usage::estimate(prompt, &text),
            Duration::ZERO,
        ))
    }
}

fn evaluator(generator: Arc<EchoGenerator>, judge: JudgeMode) -> FitnessEvaluator {
    FitnessEvaluator::new(
        Arc::new(StaticRetriever),
        generator,
        Arc::new(FakeJudge { mode: judge }),
    )
}

fn request(retrieval_weight: f64, judged_weight: f64) -> OptimizationRequest {
    let mut criteria = Vec::new();
    if retrieval_weight > 0.0 {
        criteria.push(EvaluationCriterion::new(
            "retrieval",
            retrieval_weight,
            CriterionKind::retrieval_f1(),
        ));
    }
    if judged_weight > 0.0 {
        criteria.push(EvaluationCriterion::new(
            "quality",
            judged_weight,
            CriterionKind::LlmJudged {
                dimensions: vec!["relevance".to_string()],
                rubric: None,
            },
        ));
    }
    OptimizationRequest::new(
        PromptTemplate::single("Answer the customer question using the context."),
        vec![
            TestCase::new("refund", "How long is the refund window?")
                .with_expected_chunks(["1", "5"]),
            TestCase::new("tone", "Can I get my money back?").with_reference("Yes, within 30 days."),
        ],
        criteria,
    )
}

fn recorder() -> (Arc<dyn ProgressSink>, Arc<Mutex<Vec<StampedEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink: Arc<dyn ProgressSink> =
        Arc::new(move |e: &StampedEvent| sink_events.lock().unwrap().push(e.clone()));
    (sink, events)
}

fn base_config() -> OptimizerConfig {
    OptimizerConfig::default()
        .with_population_size(10)
        .with_max_generations(4)
        .with_max_stagnation(0)
        .with_target_score(1.0)
        .with_seed(1234)
}

async fn run(
    evaluator: &FitnessEvaluator,
    request: &OptimizationRequest,
    config: &OptimizerConfig,
) -> (OptimizationRun, Vec<StampedEvent>) {
    let (sink, events) = recorder();
    let optimizer = Optimizer::new(evaluator, sink);
    let run = optimizer.optimize(request, config).await.unwrap();
    let events = events.lock().unwrap().clone();
    (run, events)
}

#[tokio::test]
async fn test_population_size_is_constant() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let (run, events) = run(&evaluator, &request(0.5, 0.5), &base_config()).await;

    assert_eq!(run.convergence_reason, ConvergenceReason::MaxGenerations);
    assert_eq!(run.generations(), 5);
    let sizes: Vec<usize> = events
        .iter()
        .filter_map(|e| match &e.event {
            ProgressEvent::GenerationStart {
                population_size, ..
            } => Some(*population_size),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![10; 5]);
    assert_eq!(run.final_population.len(), 10);
}

#[tokio::test]
async fn test_best_score_never_decreases() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let (run, _) = run(&evaluator, &request(0.3, 0.7), &base_config()).await;

    for pair in run.history.windows(2) {
        assert!(pair[1].best_score >= pair[0].best_score);
    }
    let best_ever = run
        .history
        .iter()
        .map(|r| r.best_score)
        .fold(f64::MIN, f64::max);
    assert_eq!(run.best_score(), best_ever);
}

#[tokio::test]
async fn test_exactly_two_elites_carried() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let config = base_config().with_max_generations(1).with_elitism_fraction(0.2);
    let (run, _) = run(&evaluator, &request(0.5, 0.5), &config).await;

    let final_generation = run.final_population.generation;
    assert_eq!(final_generation, 1);
    let carried = run
        .final_population
        .iter()
        .filter(|c| c.generation < final_generation)
        .count();
    assert_eq!(carried, 2);

    let generation_zero_best = &run.history[0].best_candidate;
    assert!(run
        .final_population
        .iter()
        .any(|c| c.id == generation_zero_best.id
            && c.combined_score == generation_zero_best.combined_score));
}

#[tokio::test]
async fn test_zero_max_generations_evaluates_only_generation_zero() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Constant(0.5));
    let config = base_config().with_max_generations(0);
    let (run, _) = run(&evaluator, &request(0.5, 0.5), &config).await;

    assert_eq!(run.convergence_reason, ConvergenceReason::MaxGenerations);
    assert_eq!(run.generations(), 1);
    assert_eq!(run.archive.len(), 10);
    assert!(run.archive.iter().all(|c| c.generation == 0 && c.is_scored()));
    assert_eq!(run.exit_code(), 1);
}

#[tokio::test]
async fn test_mutation_rate_one_marks_every_offspring() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let config = base_config().with_mutation_rate(1.0).with_max_generations(2);
    let (run, _) = run(&evaluator, &request(0.5, 0.5), &config).await;

    let offspring: Vec<_> = run.archive.iter().filter(|c| c.generation >= 1).collect();
    assert!(!offspring.is_empty());
    assert!(offspring.iter().all(|c| !c.mutation_history.is_empty()));
}

#[tokio::test]
async fn test_mutation_rate_zero_leaves_offspring_unmutated() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let config = base_config().with_mutation_rate(0.0).with_max_generations(2);
    let (run, _) = run(&evaluator, &request(0.5, 0.5), &config).await;

    let offspring: Vec<_> = run.archive.iter().filter(|c| c.generation >= 1).collect();
    assert!(!offspring.is_empty());
    assert!(offspring.iter().all(|c| c.mutation_history.is_empty()));
}

#[tokio::test]
async fn test_invalid_weights_rejected_before_evaluation() {
    let generator = EchoGenerator::new(0.0);
    let evaluator = evaluator(generator.clone(), JudgeMode::Constant(0.5));
    let (sink, events) = recorder();
    let optimizer = Optimizer::new(&evaluator, sink);

    let result = optimizer
        .optimize(&request(0.4, 0.4), &base_config())
        .await;

    assert!(matches!(
        result,
        Err(OptimizerError::Config(ConfigError::WeightSum(_)))
    ));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_time_budget_is_a_config_error() {
    let generator = EchoGenerator::new(0.0);
    let evaluator = evaluator(generator.clone(), JudgeMode::Constant(0.5));
    let (sink, _) = recorder();
    let optimizer = Optimizer::new(&evaluator, sink);
    let config = OptimizerConfig {
        time_budget_secs: Some(1e20),
        ..base_config()
    };

    let result = optimizer.optimize(&request(0.5, 0.5), &config).await;

    assert!(matches!(
        result,
        Err(OptimizerError::Config(ConfigError::InvalidBudget { .. }))
    ));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_target_reached_stops_early() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Constant(1.0));
    let config = base_config().with_target_score(0.95);
    let (run, events) = run(&evaluator, &request(0.0, 1.0), &config).await;

    assert_eq!(run.convergence_reason, ConvergenceReason::TargetReached);
    assert_eq!(run.generations(), 1);
    assert!(run.is_success());
    assert_eq!(run.exit_code(), 0);
    assert_eq!(run.best_candidate.id.value(), 0);
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(ProgressEvent::Convergence { reason, .. }) if reason == "target-reached"
    ));
}

#[tokio::test]
async fn test_stagnation_stops_after_flat_generations() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Constant(0.5));
    let config = base_config().with_max_stagnation(2).with_max_generations(10);
    let (run, events) = run(&evaluator, &request(0.0, 1.0), &config).await;

    assert_eq!(run.convergence_reason, ConvergenceReason::Stagnation);
    assert_eq!(run.generations(), 3);
    let stagnation_events = events
        .iter()
        .filter(|e| matches!(e.event, ProgressEvent::Stagnation { .. }))
        .count();
    assert_eq!(stagnation_events, 2);
}

#[tokio::test]
async fn test_cost_budget_exceeded() {
    let evaluator = evaluator(EchoGenerator::new(0.01), JudgeMode::Constant(0.5));
    let config = base_config().with_cost_budget(0.05);
    let (run, _) = run(&evaluator, &request(0.0, 1.0), &config).await;

    assert_eq!(run.convergence_reason, ConvergenceReason::BudgetExceeded);
    assert_eq!(run.generations(), 1);
    assert!(run.total_cost > 0.05);
}

#[tokio::test]
async fn test_rewrite_spend_counts_against_budget() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Constant(0.5));
    let rewriter = Arc::new(PricedRewriter {
        cost: 1.0,
        calls: AtomicUsize::new(0),
    });
    let (sink, _) = recorder();
    let optimizer = Optimizer::new(&evaluator, sink)
        .with_mutator(Mutator::new().with_rewriter(rewriter.clone()));
    let config = base_config()
        .with_cost_budget(0.5)
        .with_mutation_rate(1.0)
        .with_max_generations(3);

    let run = optimizer.optimize(&request(0.0, 1.0), &config).await.unwrap();

    let calls = rewriter.calls.load(Ordering::SeqCst);
    assert!(calls > 0);
    assert_eq!(run.convergence_reason, ConvergenceReason::BudgetExceeded);
    assert_eq!(run.generations(), 1);
    assert_eq!(run.total_cost, calls as f64);
    let bred: f64 = run.archive.iter().map(|c| c.metadata.mutation_cost).sum();
    assert_eq!(bred, run.total_cost);
    assert_eq!(run.history[0].cumulative_cost, run.total_cost);
}

#[tokio::test]
async fn test_interrupt_finishes_current_generation() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Constant(0.5));
    let (sink, events) = recorder();
    let optimizer = Optimizer::new(&evaluator, sink);
    optimizer
        .interrupt_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let run = optimizer
        .optimize(&request(0.5, 0.5), &base_config())
        .await
        .unwrap();

    assert_eq!(run.convergence_reason, ConvergenceReason::Interrupted);
    assert_eq!(run.exit_code(), 130);
    assert_eq!(run.generations(), 1);
    assert!(run.final_population.iter().all(|c| c.is_scored()));
    assert!(matches!(
        events.lock().unwrap().last().map(|e| &e.event),
        Some(ProgressEvent::Convergence { reason, .. }) if reason == "interrupted"
    ));
}

#[tokio::test]
async fn test_failing_judge_degrades_without_aborting() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Failing);
    let config = base_config().with_max_generations(1);
    let (run, events) = run(&evaluator, &request(0.5, 0.5), &config).await;

    assert_eq!(run.convergence_reason, ConvergenceReason::MaxGenerations);
    let best = &run.best_candidate;
    assert_eq!(best.criterion_scores["quality"], 0.1);
    assert_eq!(best.metadata.degraded_criteria, vec!["quality".to_string()]);
    assert!(events
        .iter()
        .any(|e| matches!(e.event, ProgressEvent::Error { .. })));
}

#[tokio::test]
async fn test_unparseable_judge_scores_neutral() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Broken);
    let config = base_config().with_max_generations(0);
    let (run, _) = run(&evaluator, &request(0.0, 1.0), &config).await;

    assert!(run
        .archive
        .iter()
        .all(|c| c.combined_score == Some(0.5)));
}

#[tokio::test]
async fn test_combined_score_matches_weighted_sum() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let config = base_config().with_max_generations(1);
    let (run, _) = run(&evaluator, &request(0.3, 0.7), &config).await;

    for candidate in &run.archive {
        let expected = 0.3 * candidate.criterion_scores["retrieval"]
            + 0.7 * candidate.criterion_scores["quality"];
        assert!((candidate.combined_score.unwrap() - expected).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_seeded_runs_are_reproducible() {
    let config = base_config().with_max_generations(3);
    let first = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let second = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);

    let (a, _) = run(&first, &request(0.5, 0.5), &config).await;
    let (b, _) = run(&second, &request(0.5, 0.5), &config).await;

    assert_eq!(a.best_candidate.prompt, b.best_candidate.prompt);
    let scores = |r: &OptimizationRun| r.history.iter().map(|h| h.best_score).collect::<Vec<_>>();
    assert_eq!(scores(&a), scores(&b));
}

#[tokio::test]
async fn test_concurrent_evaluation_scores_everyone() {
    let generator = EchoGenerator::new(0.0);
    let evaluator = evaluator(generator.clone(), JudgeMode::Length);
    let config = base_config()
        .with_max_generations(1)
        .with_evaluation_concurrency(4);
    let (run, events) = run(&evaluator, &request(0.5, 0.5), &config).await;

    assert!(run.final_population.iter().all(|c| c.is_scored()));
    let progress = events
        .iter()
        .filter(|e| matches!(e.event, ProgressEvent::EvaluationProgress { .. }))
        .count();
    let scored = run.archive.iter().filter(|c| c.is_scored()).count();
    assert_eq!(progress, scored);
    // One response per test case per evaluated candidate
    assert_eq!(generator.calls.load(Ordering::SeqCst), scored * 2);
}

#[tokio::test]
async fn test_event_sequence_brackets_the_run() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let config = base_config().with_max_generations(2);
    let (run, events) = run(&evaluator, &request(0.5, 0.5), &config).await;

    assert!(matches!(
        events.first().map(|e| &e.event),
        Some(ProgressEvent::RunStarted { .. })
    ));
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(ProgressEvent::Convergence { .. })
    ));
    let completed = events
        .iter()
        .filter(|e| matches!(e.event, ProgressEvent::GenerationCompleted { .. }))
        .count();
    assert_eq!(completed, run.generations());
}

#[tokio::test]
async fn test_interrupt_mid_run_keeps_history_consistent() {
    let evaluator = evaluator(EchoGenerator::new(0.0), JudgeMode::Length);
    let handle: Arc<Mutex<Option<Arc<AtomicBool>>>> = Arc::new(Mutex::new(None));
    let events = Arc::new(Mutex::new(Vec::new()));

    let sink_handle = handle.clone();
    let sink_events = events.clone();
    let sink: Arc<dyn ProgressSink> = Arc::new(move |e: &StampedEvent| {
        // Raise the flag once generation 1 is done, after one advance
        if let ProgressEvent::GenerationCompleted { generation: 1, .. } = e.event {
            if let Some(flag) = sink_handle.lock().unwrap().as_ref() {
                flag.store(true, Ordering::SeqCst);
            }
        }
        sink_events.lock().unwrap().push(e.clone());
    });
    let optimizer = Optimizer::new(&evaluator, sink);
    *handle.lock().unwrap() = Some(optimizer.interrupt_handle());

    let run = optimizer
        .optimize(&request(0.5, 0.5), &base_config())
        .await
        .unwrap();

    assert_eq!(run.convergence_reason, ConvergenceReason::Interrupted);
    assert_eq!(run.exit_code(), 130);
    assert_eq!(run.generations(), 2);
    let generations: Vec<usize> = run.history.iter().map(|r| r.generation).collect();
    assert_eq!(generations, vec![0, 1]);
    assert_eq!(run.final_population.generation, 1);
    assert!(run.final_population.iter().all(|c| c.is_scored()));

    let best_recorded = run
        .history
        .iter()
        .map(|r| r.best_score)
        .fold(f64::MIN, f64::max);
    assert_eq!(run.best_score(), best_recorded);
    assert!(run.archive.iter().any(|c| c.id == run.best_candidate.id));
    assert!(run.archive.iter().all(|c| c.generation <= 1));

    let events = events.lock().unwrap();
    let started = events
        .iter()
        .filter(|e| matches!(e.event, ProgressEvent::GenerationStart { .. }))
        .count();
    assert_eq!(started, 2);
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(ProgressEvent::Convergence { reason, generations: 2, .. }) if reason == "interrupted"
    ));
}
