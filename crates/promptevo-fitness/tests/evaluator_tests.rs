use async_trait::async_trait;
use promptevo_fitness::{
    CriterionKind, EvaluationCriterion, FitnessEvaluator, FitnessReport, FitnessSubject,
    PromptTemplate, RetrievalMetric, TestCase,
};
use promptevo_providers::{
    GenerateOptions, Generation, Generator, LlmError, RetrievalError, Retriever, ScoredDocument,
    Usage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FixedRetriever {
    ids: Vec<&'static str>,
    calls: AtomicUsize,
}

impl FixedRetriever {
    fn new(ids: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            ids,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<ScoredDocument>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ids
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(i, id)| ScoredDocument {
                id: id.to_string(),
                score: 1.0 - i as f64 * 0.1,
                content: format!("document {}", id),
            })
            .collect())
    }
}

struct ScriptedGenerator {
    reply: Result<String, ()>,
    cost: f64,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            cost: 0.01,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(()),
            cost: 0.0,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(Generation::new(
                text.clone(),
                Usage::estimate(prompt, text),
                Duration::from_millis(1),
            )
            .with_cost(self.cost)),
            Err(()) => Err(LlmError::Server("upstream returned 500".to_string())),
        }
    }
}

#[derive(Default)]
struct Subject {
    prompt: PromptTemplate,
    score: Option<f64>,
}

impl FitnessSubject for Subject {
    fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    fn is_scored(&self) -> bool {
        self.score.is_some()
    }

    fn apply_fitness(&mut self, report: &FitnessReport) {
        self.score = Some(report.combined_score);
    }
}

fn refund_case() -> TestCase {
    TestCase::new("refund", "How long is the refund window?")
        .with_expected_chunks(["1", "5"])
        .with_reference("30 days")
}

fn retrieval_only() -> Vec<EvaluationCriterion> {
    vec![EvaluationCriterion::new(
        "retrieval",
        1.0,
        CriterionKind::retrieval_f1(),
    )]
}

fn judged_only() -> Vec<EvaluationCriterion> {
    vec![EvaluationCriterion::new("quality", 1.0, CriterionKind::judged())]
}

const EPS: f64 = 1e-9;

#[tokio::test]
async fn test_retrieval_f1_scores_partial_overlap() {
    let evaluator = FitnessEvaluator::new(
        FixedRetriever::new(vec!["1", "2", "5"]),
        ScriptedGenerator::replying("Thirty days."),
        ScriptedGenerator::replying("{}"),
    );

    let prompt = PromptTemplate::single("Answer using the context.");
    let report = evaluator
        .score_prompt(&prompt, &[refund_case()], &retrieval_only())
        .await;

    assert!((report.combined_score - 0.8).abs() < 1e-6);
    assert!((report.criterion_scores["retrieval"] - 0.8).abs() < 1e-6);
    assert!(!report.is_degraded());
    assert_eq!(report.cost, 0.0);
}

#[tokio::test]
async fn test_retrieval_metric_selection() {
    let evaluator = FitnessEvaluator::new(
        FixedRetriever::new(vec!["1", "2", "5"]),
        ScriptedGenerator::replying("Thirty days."),
        ScriptedGenerator::replying("{}"),
    );
    let criteria = vec![EvaluationCriterion::new(
        "recall",
        1.0,
        CriterionKind::Retrieval {
            metric: RetrievalMetric::Recall,
        },
    )];

    let report = evaluator
        .score_prompt(&PromptTemplate::single("Answer."), &[refund_case()], &criteria)
        .await;
    assert!((report.combined_score - 1.0).abs() < EPS);
}

#[tokio::test]
async fn test_retrieval_without_ground_truth_scores_zero_with_warning() {
    let evaluator = FitnessEvaluator::new(
        FixedRetriever::new(vec!["1"]),
        ScriptedGenerator::replying("Thirty days."),
        ScriptedGenerator::replying("{}"),
    );

    let case = TestCase::new("open", "Summarize the policy");
    let report = evaluator
        .score_prompt(&PromptTemplate::single("Answer."), &[case], &retrieval_only())
        .await;

    assert_eq!(report.combined_score, 0.0);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("retrieval:"));
}

#[tokio::test]
async fn test_unparseable_judge_output_is_neutral() {
    let evaluator = FitnessEvaluator::new(
        FixedRetriever::new(vec!["1"]),
        ScriptedGenerator::replying("Thirty days."),
        ScriptedGenerator::replying("The answer looks fine to me."),
    );

    let report = evaluator
        .score_prompt(&PromptTemplate::single("Answer."), &[refund_case()], &judged_only())
        .await;

    assert!((report.combined_score - 0.5).abs() < EPS);
    assert!(!report.is_degraded());
    assert!(report.warnings.iter().any(|w| w.contains("refund")));
}

#[tokio::test]
async fn test_judge_json_scores_are_averaged() {
    let evaluator = FitnessEvaluator::new(
        FixedRetriever::new(vec!["1"]),
        ScriptedGenerator::replying("Thirty days."),
        ScriptedGenerator::replying(
            r#"{"relevance": 1.0, "accuracy": 0.8, "completeness": 0.6, "clarity": 0.6}"#,
        ),
    );

    let report = evaluator
        .score_prompt(&PromptTemplate::single("Answer."), &[refund_case()], &judged_only())
        .await;

    assert!((report.combined_score - 0.75).abs() < EPS);
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_failing_generator_yields_penalty() {
    let judge = ScriptedGenerator::replying(r#"{"relevance": 1.0}"#);
    let evaluator = FitnessEvaluator::new(
        FixedRetriever::new(vec!["1", "5"]),
        ScriptedGenerator::failing(),
        judge.clone(),
    );
    let criteria = vec![
        EvaluationCriterion::new("retrieval", 0.5, CriterionKind::retrieval_f1()),
        EvaluationCriterion::new("quality", 0.5, CriterionKind::judged()),
    ];

    let report = evaluator
        .score_prompt(&PromptTemplate::single("Answer."), &[refund_case()], &criteria)
        .await;

    assert_eq!(report.criterion_scores["quality"], 0.1);
    assert!((report.criterion_scores["retrieval"] - 1.0).abs() < EPS);
    assert!((report.combined_score - 0.55).abs() < EPS);
    assert_eq!(report.degraded_criteria, vec!["quality".to_string()]);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retrievals_and_responses_are_memoized_across_criteria() {
    let retriever = FixedRetriever::new(vec!["1", "5"]);
    let generator = ScriptedGenerator::replying("Thirty days.");
    let judge = ScriptedGenerator::replying(r#"{"relevance": 0.9}"#);
    let evaluator = FitnessEvaluator::new(retriever.clone(), generator.clone(), judge.clone());

    let criteria = vec![
        EvaluationCriterion::new("retrieval", 0.4, CriterionKind::retrieval_f1()),
        EvaluationCriterion::new("quality", 0.3, CriterionKind::judged()),
        EvaluationCriterion::new(
            "tone",
            0.3,
            CriterionKind::LlmJudged {
                dimensions: vec!["tone".to_string()],
                rubric: Some("Friendly and brief.".to_string()),
            },
        ),
    ];
    let cases = vec![refund_case(), TestCase::new("hours", "When are you open?")];

    let report = evaluator
        .score_prompt(&PromptTemplate::single("Answer."), &cases, &criteria)
        .await;

    assert_eq!(retriever.calls.load(Ordering::SeqCst), 2);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.external_calls, 6);
    assert!((report.cost - 0.06).abs() < 1e-9);
}

#[tokio::test]
async fn test_evaluate_skips_scored_subject() {
    let generator = ScriptedGenerator::replying("Thirty days.");
    let evaluator = FitnessEvaluator::new(
        FixedRetriever::new(vec!["1", "5"]),
        generator.clone(),
        ScriptedGenerator::replying(r#"{"relevance": 0.9}"#),
    );
    let cases = [refund_case()];
    let criteria = judged_only();

    let mut subject = Subject {
        prompt: PromptTemplate::single("Answer."),
        score: None,
    };
    let first = evaluator.evaluate(&mut subject, &cases, &criteria).await;
    assert!(first.is_some());
    assert!((subject.score.unwrap_or_default() - 0.9).abs() < EPS);

    let second = evaluator.evaluate(&mut subject, &cases, &criteria).await;
    assert!(second.is_none());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}
