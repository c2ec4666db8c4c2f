use promptevo_fitness::PromptTemplate;
use promptevo_providers::{GenerateOptions, Generator};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Structural transformations a mutation can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    AddContext,
    AddConstraint,
    AddExamples,
    ReformatAsMarkdown,
    ReformatAsXml,
    ToneAdjustment,
}

impl MutationKind {
    pub const ALL: [MutationKind; 6] = [
        MutationKind::AddContext,
        MutationKind::AddConstraint,
        MutationKind::AddExamples,
        MutationKind::ReformatAsMarkdown,
        MutationKind::ReformatAsXml,
        MutationKind::ToneAdjustment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::AddContext => "add-context",
            MutationKind::AddConstraint => "add-constraint",
            MutationKind::AddExamples => "add-examples",
            MutationKind::ReformatAsMarkdown => "reformat-as-markdown",
            MutationKind::ReformatAsXml => "reformat-as-xml",
            MutationKind::ToneAdjustment => "tone-adjustment",
        }
    }

    /// Rewrites go through the rewriter model when one is configured
    pub fn is_rewrite(&self) -> bool {
        matches!(
            self,
            MutationKind::ReformatAsMarkdown
                | MutationKind::ReformatAsXml
                | MutationKind::ToneAdjustment
        )
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const CONTEXT_SNIPPETS: &[&str] = &[
    "Base the answer only on the provided context. If the context does not contain the answer, say so.",
    "The context passages come from the product documentation and are ordered by relevance.",
    "Read every context passage before answering and prefer the most specific one.",
];

const CONSTRAINT_SNIPPETS: &[&str] = &[
    "Keep the answer under 150 words.",
    "Cite the ids of the context passages you rely on in square brackets.",
    "Do not speculate beyond what the context states.",
    "Answer the question directly in the first sentence.",
];

const EXAMPLE_SNIPPETS: &[&str] = &[
    "Example:\nQuestion: How long do refunds take?\nAnswer: Refunds are processed within 5 business days [doc-3].",
    "Example:\nQuestion: Can I change my plan later?\nAnswer: Yes. Plans can be changed at any time from the billing page [doc-7].",
];

const TONES: &[&str] = &["formal", "friendly", "concise", "neutral"];

const PLACEHOLDERS: &[&str] = &["{query}", "{context}"];

/// One transformation chosen for a slot, before it is applied
#[derive(Debug, Clone, PartialEq)]
struct PlannedMutation {
    kind: MutationKind,
    slot: String,
    variant: usize,
}

/// A mutated prompt and what happened while producing it
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub prompt: PromptTemplate,
    pub applied: Vec<MutationKind>,
    /// Rewrites that failed and left the slot untouched
    pub fallbacks: Vec<MutationKind>,
    /// Spend on rewriter calls, failed ones included
    pub cost: f64,
}

/// Applies catalog mutations, optionally delegating rewrites to a model
#[derive(Clone, Default)]
pub struct Mutator {
    rewriter: Option<Arc<dyn Generator>>,
    options: GenerateOptions,
    cost_per_1k_tokens: Option<f64>,
}

impl Mutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn Generator>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Price rewrites whose provider reports no cost
    pub fn with_cost_per_1k_tokens(mut self, rate: Option<f64>) -> Self {
        self.cost_per_1k_tokens = rate;
        self
    }

    pub fn has_rewriter(&self) -> bool {
        self.rewriter.is_some()
    }

    /// With probability `rate`, apply one to three distinct transformations,
    /// each on a randomly chosen slot.
    ///
    /// Every random draw happens before any rewrite call, so a seeded run
    /// makes the same choices regardless of rewriter timing.
    pub async fn mutate<R>(&self, prompt: &PromptTemplate, rate: f64, rng: &mut R) -> MutationOutcome
    where
        R: Rng + ?Sized,
    {
        let plan = plan_mutations(prompt, rate, rng);
        let mut mutated = prompt.clone();
        let mut applied = Vec::with_capacity(plan.len());
        let mut fallbacks = Vec::new();
        let mut cost = 0.0;

        for step in plan {
            let Some(original) = mutated.get(&step.slot).map(str::to_string) else {
                continue;
            };
            let rewritten = if step.kind.is_rewrite() {
                let (text, spend) = self.rewrite(step.kind, &original, step.variant).await;
                cost += spend;
                match text {
                    Some(text) => text,
                    None => {
                        fallbacks.push(step.kind);
                        original.clone()
                    }
                }
            } else {
                insert_snippet(step.kind, &original, step.variant)
            };
            debug!(mutation = %step.kind, slot = %step.slot, "Applied mutation");
            mutated.set(&step.slot, rewritten);
            applied.push(step.kind);
        }

        MutationOutcome {
            prompt: mutated,
            applied,
            fallbacks,
            cost,
        }
    }

    /// The rewritten text (`None` when the rewriter failed and the slot keeps
    /// its text) and what the call cost.
    async fn rewrite(&self, kind: MutationKind, text: &str, variant: usize) -> (Option<String>, f64) {
        let Some(rewriter) = &self.rewriter else {
            return (Some(local_rewrite(kind, text, variant)), 0.0);
        };

        let request = build_rewrite_prompt(kind, text, variant);
        match rewriter.generate(&request, &self.options).await {
            Ok(generation) => {
                let cost = generation.cost_or_estimate(self.cost_per_1k_tokens);
                (accept_rewrite(kind, text, &generation.text), cost)
            }
            Err(e) => {
                warn!(mutation = %kind, error = %e, "Rewrite failed, keeping original");
                (None, 0.0)
            }
        }
    }
}

fn accept_rewrite(kind: MutationKind, original: &str, rewritten: &str) -> Option<String> {
    let candidate = rewritten.trim();
    if candidate.is_empty() {
        warn!(mutation = %kind, "Rewriter returned empty text, keeping original");
        return None;
    }
    if let Some(missing) = PLACEHOLDERS
        .iter()
        .find(|p| original.contains(**p) && !candidate.contains(**p))
    {
        warn!(mutation = %kind, placeholder = %missing, "Rewrite dropped a placeholder, keeping original");
        return None;
    }
    Some(candidate.to_string())
}

fn plan_mutations<R>(prompt: &PromptTemplate, rate: f64, rng: &mut R) -> Vec<PlannedMutation>
where
    R: Rng + ?Sized,
{
    if prompt.components().is_empty() || !rng.random_bool(rate.clamp(0.0, 1.0)) {
        return Vec::new();
    }

    let count = rng.random_range(1..=3);
    let mut kinds = MutationKind::ALL.to_vec();
    let mut plan = Vec::with_capacity(count);
    for _ in 0..count {
        let kind = kinds.swap_remove(rng.random_range(0..kinds.len()));
        let slot = prompt.components()[rng.random_range(0..prompt.len())]
            .name
            .clone();
        let variant = rng.random_range(0..variant_count(kind));
        plan.push(PlannedMutation {
            kind,
            slot,
            variant,
        });
    }
    plan
}

fn variant_count(kind: MutationKind) -> usize {
    match kind {
        MutationKind::AddContext => CONTEXT_SNIPPETS.len(),
        MutationKind::AddConstraint => CONSTRAINT_SNIPPETS.len(),
        MutationKind::AddExamples => EXAMPLE_SNIPPETS.len(),
        MutationKind::ToneAdjustment => TONES.len(),
        MutationKind::ReformatAsMarkdown | MutationKind::ReformatAsXml => 1,
    }
}

fn insert_snippet(kind: MutationKind, text: &str, variant: usize) -> String {
    let pool = match kind {
        MutationKind::AddContext => CONTEXT_SNIPPETS,
        MutationKind::AddConstraint => CONSTRAINT_SNIPPETS,
        MutationKind::AddExamples => EXAMPLE_SNIPPETS,
        _ => return local_rewrite(kind, text, variant),
    };
    // Prefer a snippet the slot does not already carry
    let snippet = (0..pool.len())
        .map(|offset| pool[(variant + offset) % pool.len()])
        .find(|s| !text.contains(*s))
        .unwrap_or(pool[variant % pool.len()]);

    let text = text.trim_end();
    if text.is_empty() {
        snippet.to_string()
    } else {
        format!("{}\n\n{}", text, snippet)
    }
}

fn local_rewrite(kind: MutationKind, text: &str, variant: usize) -> String {
    let trimmed = text.trim();
    match kind {
        MutationKind::ReformatAsMarkdown => {
            let body: Vec<&str> = split_sentences(trimmed)
                .into_iter()
                .map(|s| s.trim_start_matches(['-', '*', ' ']))
                .collect();
            format!(
                "## Instructions\n\n{}",
                body.iter()
                    .map(|s| format!("- {}", s))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        }
        MutationKind::ReformatAsXml => {
            if trimmed.starts_with("<instructions>") {
                trimmed.to_string()
            } else {
                format!("<instructions>\n{}\n</instructions>", trimmed)
            }
        }
        MutationKind::ToneAdjustment => {
            let tone = TONES[variant % TONES.len()];
            format!("Respond in a {} tone.\n\n{}", tone, trimmed)
        }
        _ => insert_snippet(kind, text, variant),
    }
}

fn build_rewrite_prompt(kind: MutationKind, text: &str, variant: usize) -> String {
    let instruction = match kind {
        MutationKind::ReformatAsMarkdown => {
            "as structured Markdown with headings and bullet points".to_string()
        }
        MutationKind::ReformatAsXml => "using XML tags to delimit each section".to_string(),
        MutationKind::ToneAdjustment => {
            format!("in a {} tone", TONES[variant % TONES.len()])
        }
        _ => "more clearly".to_string(),
    };
    format!(
        "Rewrite the following prompt template {}, preserving its meaning. \
         Keep every placeholder such as {{query}} and {{context}} exactly as written. \
         Return only the rewritten template.\n\n---\n{}",
        instruction, text
    )
}

/// Combine two parent prompts slot by slot.
///
/// Shared slots come from either parent with probability 0.5. Slots only in
/// the first parent are kept; slots only in the second are taken with
/// probability 0.5. Two single-slot parents are spliced at sentence level.
pub fn crossover<R>(first: &PromptTemplate, second: &PromptTemplate, rng: &mut R) -> PromptTemplate
where
    R: Rng + ?Sized,
{
    if first.is_free_text() && second.is_free_text() {
        return splice_sentences(first, second, rng);
    }

    let mut child = PromptTemplate::default();
    for component in first.components() {
        let text = match second.get(&component.name) {
            Some(other) if rng.random_bool(0.5) => other,
            _ => component.template.as_str(),
        };
        child.set(&component.name, text);
    }
    for component in second.components() {
        if first.get(&component.name).is_none() && rng.random_bool(0.5) {
            child.set(&component.name, component.template.as_str());
        }
    }

    if child.is_empty() {
        first.clone()
    } else {
        child
    }
}

fn splice_sentences<R>(first: &PromptTemplate, second: &PromptTemplate, rng: &mut R) -> PromptTemplate
where
    R: Rng + ?Sized,
{
    let (Some(head_slot), Some(tail_slot)) = (first.components().first(), second.components().first())
    else {
        return first.clone();
    };
    let head = split_sentences(&head_slot.template);
    let tail = split_sentences(&tail_slot.template);
    if head.is_empty() || tail.is_empty() {
        return first.clone();
    }

    let cut_head = rng.random_range(1..=head.len());
    let cut_tail = rng.random_range(0..tail.len());
    let spliced = head[..cut_head]
        .iter()
        .chain(&tail[cut_tail..])
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    let mut child = first.clone();
    child.set(&head_slot.name, spliced);
    child
}

/// Split text after `.`, `!` or `?` followed by whitespace, and at line breaks
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                None => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}
