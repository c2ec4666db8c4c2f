use promptevo_providers::{GenerateOptions, Generation, Generator, Retriever, ScoredDocument};
use std::sync::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{FitnessOptions, PromptTemplate, ScorerError, TestCase};

/// Cost and token totals for every external call made during one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostLedger {
    pub cost: f64,
    pub calls: u32,
    pub tokens: u32,
}

/// State shared by all criterion scorers while one candidate is evaluated.
///
/// Retrieval results and generated responses are memoized per test case, so
/// several criteria reading the same case hit the external collaborators once.
pub struct EvaluationSession<'a> {
    prompt: &'a PromptTemplate,
    test_cases: &'a [TestCase],
    retriever: &'a dyn Retriever,
    generator: &'a dyn Generator,
    options: &'a FitnessOptions,
    retrievals: Vec<OnceCell<Vec<ScoredDocument>>>,
    responses: Vec<OnceCell<String>>,
    ledger: Mutex<CostLedger>,
}

impl<'a> EvaluationSession<'a> {
    pub fn new(
        prompt: &'a PromptTemplate,
        test_cases: &'a [TestCase],
        retriever: &'a dyn Retriever,
        generator: &'a dyn Generator,
        options: &'a FitnessOptions,
    ) -> Self {
        Self {
            prompt,
            test_cases,
            retriever,
            generator,
            options,
            retrievals: test_cases.iter().map(|_| OnceCell::new()).collect(),
            responses: test_cases.iter().map(|_| OnceCell::new()).collect(),
            ledger: Mutex::new(CostLedger::default()),
        }
    }

    pub fn prompt(&self) -> &PromptTemplate {
        self.prompt
    }

    pub fn test_cases(&self) -> &[TestCase] {
        self.test_cases
    }

    pub fn options(&self) -> &FitnessOptions {
        self.options
    }

    /// Documents retrieved for the test case at `index`, using the candidate's retrieval query
    pub async fn retrieve(&self, index: usize) -> Result<&[ScoredDocument], ScorerError> {
        let case = &self.test_cases[index];
        let documents = self.retrievals[index]
            .get_or_try_init(|| async {
                let query = self.prompt.retrieval_query(&case.query);
                debug!(case = %case.id, query_len = query.len(), "Retrieving context");
                self.retriever
                    .search(&query, self.options.top_k)
                    .await
                    .map_err(ScorerError::from)
            })
            .await?;
        Ok(documents.as_slice())
    }

    /// The candidate's generated response for the test case at `index`
    pub async fn respond(&self, index: usize) -> Result<&str, ScorerError> {
        let case = &self.test_cases[index];
        let response = self.responses[index]
            .get_or_try_init(|| async {
                let documents = self.retrieve(index).await?;
                let rendered = self.prompt.render(&case.query, documents);
                let options =
                    GenerateOptions::default().with_temperature(self.options.response_temperature);
                debug!(case = %case.id, prompt_len = rendered.len(), "Generating response");
                let generation = self.generator.generate(&rendered, &options).await?;
                self.record(&generation);
                Ok::<_, ScorerError>(generation.text)
            })
            .await?;
        Ok(response.as_str())
    }

    /// Account for an external generation call
    pub fn record(&self, generation: &Generation) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.cost += generation.cost_or_estimate(self.options.cost_per_1k_tokens);
            ledger.calls += 1;
            ledger.tokens += generation.usage.total();
        }
    }

    pub fn ledger(&self) -> CostLedger {
        self.ledger.lock().map(|l| *l).unwrap_or_default()
    }
}
