use promptevo_providers::{estimate_tokens, ScoredDocument};
use serde::{Deserialize, Serialize};

/// Slot holding the instructions used to answer the query
pub const RESPONSE_GENERATION: &str = "response_generation";
/// Slot describing how retrieved context is presented; `{context}` marks the documents
pub const CONTEXT_FORMATTING: &str = "context_formatting";
/// Slot rewriting the user query before retrieval; `{query}` marks the raw query
pub const QUERY_ENHANCEMENT: &str = "query_enhancement";

/// One named text template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptComponent {
    pub name: String,
    pub template: String,
}

impl PromptComponent {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }
}

/// An ordered tuple of named templates making up one prompt variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    components: Vec<PromptComponent>,
}

impl PromptTemplate {
    pub fn new(components: Vec<PromptComponent>) -> Self {
        Self { components }
    }

    /// A free-text prompt occupying the response-generation slot
    pub fn single(text: impl Into<String>) -> Self {
        Self::new(vec![PromptComponent::new(RESPONSE_GENERATION, text)])
    }

    pub fn components(&self) -> &[PromptComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True when there are no components or every component is blank
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|c| c.template.trim().is_empty())
    }

    /// True when the prompt is a single free-text slot
    pub fn is_free_text(&self) -> bool {
        self.components.len() == 1
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.template.as_str())
    }

    /// Replace the text of a slot, appending the slot when absent
    pub fn set(&mut self, name: &str, template: impl Into<String>) {
        let template = template.into();
        match self.components.iter_mut().find(|c| c.name == name) {
            Some(component) => component.template = template,
            None => self.components.push(PromptComponent::new(name, template)),
        }
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.name.as_str())
    }

    pub fn token_estimate(&self) -> u32 {
        self.components
            .iter()
            .map(|c| estimate_tokens(&c.template))
            .sum()
    }

    /// The query sent to the retriever for a test-case query
    pub fn retrieval_query(&self, query: &str) -> String {
        match self.get(QUERY_ENHANCEMENT) {
            Some(template) if template.contains("{query}") => template.replace("{query}", query),
            Some(template) if !template.trim().is_empty() => format!("{} {}", template.trim(), query),
            _ => query.to_string(),
        }
    }

    /// Render the full response-generation prompt for one query and its retrieved context
    pub fn render(&self, query: &str, documents: &[ScoredDocument]) -> String {
        let raw_context = documents
            .iter()
            .map(|doc| format!("[{}] {}", doc.id, doc.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let context = match self.get(CONTEXT_FORMATTING) {
            Some(template) if template.contains("{context}") => {
                template.replace("{context}", &raw_context)
            }
            Some(template) if !raw_context.is_empty() => {
                format!("{}\n\n{}", template.trim(), raw_context)
            }
            _ => raw_context,
        };

        let body: Vec<&str> = self
            .components
            .iter()
            .filter(|c| c.name != CONTEXT_FORMATTING && c.name != QUERY_ENHANCEMENT)
            .map(|c| c.template.as_str())
            .collect();
        let body = body.join("\n\n");

        let mut rendered = body.replace("{context}", &context);
        if !body.contains("{context}") && !context.is_empty() {
            rendered = format!("Context:\n{}\n\n{}", context, rendered);
        }
        if body.contains("{query}") {
            rendered = rendered.replace("{query}", query);
        } else {
            rendered = format!("{}\n\nQuestion: {}", rendered, query);
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> ScoredDocument {
        ScoredDocument {
            id: id.into(),
            score: 1.0,
            content: content.into(),
        }
    }

    #[test]
    fn test_render_fills_placeholders() {
        let template = PromptTemplate::new(vec![
            PromptComponent::new(CONTEXT_FORMATTING, "Sources:\n{context}"),
            PromptComponent::new(RESPONSE_GENERATION, "{context}\n\nAnswer: {query}"),
        ]);
        let rendered = template.render("what is rust?", &[doc("d1", "A language.")]);
        assert_eq!(rendered, "Sources:\n[d1] A language.\n\nAnswer: what is rust?");
    }

    #[test]
    fn test_render_appends_missing_query_and_context() {
        let template = PromptTemplate::single("Be concise.");
        let rendered = template.render("why?", &[doc("a", "because")]);
        assert!(rendered.starts_with("Context:\n[a] because"));
        assert!(rendered.ends_with("Be concise.\n\nQuestion: why?"));
    }

    #[test]
    fn test_retrieval_query_uses_enhancement_slot() {
        let mut template = PromptTemplate::single("Answer.");
        assert_eq!(template.retrieval_query("refunds"), "refunds");

        template.set(QUERY_ENHANCEMENT, "policy documents about {query}");
        assert_eq!(
            template.retrieval_query("refunds"),
            "policy documents about refunds"
        );
    }

    #[test]
    fn test_is_empty_ignores_whitespace() {
        assert!(PromptTemplate::default().is_empty());
        assert!(PromptTemplate::single("   ").is_empty());
        assert!(!PromptTemplate::single("x").is_empty());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut template = PromptTemplate::single("a");
        template.set(RESPONSE_GENERATION, "b");
        assert_eq!(template.len(), 1);
        assert_eq!(template.get(RESPONSE_GENERATION), Some("b"));
    }
}
