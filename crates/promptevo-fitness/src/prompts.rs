use promptevo_providers::ScoredDocument;

/// Inputs for one judge call
#[derive(Clone, Copy)]
pub struct JudgeInput<'a> {
    pub query: &'a str,
    pub reference: Option<&'a str>,
    pub context: &'a [ScoredDocument],
    pub response: &'a str,
    pub dimensions: &'a [String],
    pub rubric: Option<&'a str>,
}

/// Prompt templates for the judge model
pub struct JudgePrompts;

impl JudgePrompts {
    /// Build the rubric prompt asking for a JSON object of sub-scores in [0, 1]
    pub fn build_judge_prompt(input: JudgeInput<'_>) -> String {
        let context = if input.context.is_empty() {
            "(no context was retrieved)".to_string()
        } else {
            input
                .context
                .iter()
                .map(|doc| format!("[{}] {}", doc.id, doc.content.trim()))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let dimension_list = input
            .dimensions
            .iter()
            .map(|d| format!("- **{}**", d))
            .collect::<Vec<_>>()
            .join("\n");

        let json_shape = input
            .dimensions
            .iter()
            .map(|d| format!("\"{}\": 0.0", d))
            .collect::<Vec<_>>()
            .join(", ");

        let rubric = input
            .rubric
            .map(|r| format!("\n## Rubric\n{}\n", r.trim()))
            .unwrap_or_default();

        format!(
            r#"You are a strict evaluator of answers produced by a retrieval-augmented assistant.

## Question
{query}

## Reference
{reference}

## Retrieved Context
{context}

## Answer Under Evaluation
{response}
{rubric}
---

Score the answer on each dimension below with a number between 0.0 (worst) and 1.0 (best):

{dimensions}

Judge only what the answer says. Reward grounding in the retrieved context and agreement with the reference; penalize unsupported claims.

## Required Response Format

Respond with a single JSON object and nothing else:

{{{shape}, "reasoning": "one or two sentences"}}"#,
            query = input.query,
            reference = input.reference.unwrap_or("(none provided)"),
            context = truncate_output(&context, 12000),
            response = truncate_output(input.response, 8000),
            rubric = rubric,
            dimensions = dimension_list,
            shape = json_shape,
        )
    }
}

pub(crate) fn truncate_output(output: &str, max_len: usize) -> &str {
    if output.len() <= max_len {
        return output;
    }
    let mut cut = max_len;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    // Prefer a line boundary
    match output[..cut].rfind('\n') {
        Some(pos) => &output[..pos],
        None => &output[..cut],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_every_dimension() {
        let dimensions = vec!["relevance".to_string(), "tone".to_string()];
        let prompt = JudgePrompts::build_judge_prompt(JudgeInput {
            query: "How long is the refund window?",
            reference: Some("30 days"),
            context: &[],
            response: "Thirty days.",
            dimensions: &dimensions,
            rubric: Some("Prefer short answers."),
        });

        assert!(prompt.contains("How long is the refund window?"));
        assert!(prompt.contains("30 days"));
        assert!(prompt.contains("\"relevance\": 0.0, \"tone\": 0.0"));
        assert!(prompt.contains("Prefer short answers."));
        assert!(prompt.contains("(no context was retrieved)"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "ééééé";
        let cut = truncate_output(text, 3);
        assert_eq!(cut, "é");
    }
}
