use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::{RetrievalError, Retriever, ScoredDocument};

/// In-memory document store scored by term-overlap cosine similarity
#[derive(Debug, Default, Clone)]
pub struct KeywordRetriever {
    documents: Vec<IndexedDocument>,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    id: String,
    content: String,
    terms: HashMap<String, f64>,
    norm: f64,
}

impl KeywordRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents<I, S, T>(documents: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut retriever = Self::new();
        for (id, content) in documents {
            retriever.add_document(id, content);
        }
        retriever
    }

    /// Load every regular file in `dir`; the document id is the file stem
    pub fn from_dir(dir: &Path) -> Result<Self, RetrievalError> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        let mut retriever = Self::new();
        for path in entries {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            retriever.add_document(stem, content);
        }

        debug!(dir = %dir.display(), documents = retriever.len(), "Loaded corpus");
        Ok(retriever)
    }

    pub fn add_document(&mut self, id: impl Into<String>, content: impl Into<String>) {
        let content = content.into();
        let terms = term_frequencies(&content);
        let norm = vector_norm(&terms);
        self.documents.push(IndexedDocument {
            id: id.into(),
            content,
            terms,
            norm,
        });
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn rank(&self, query: &str, top_k: usize) -> Vec<ScoredDocument> {
        let query_terms = term_frequencies(query);
        let query_norm = vector_norm(&query_terms);
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut hits: Vec<ScoredDocument> = self
            .documents
            .iter()
            .filter(|doc| doc.norm > 0.0)
            .filter_map(|doc| {
                let dot: f64 = query_terms
                    .iter()
                    .filter_map(|(term, weight)| doc.terms.get(term).map(|w| w * weight))
                    .sum();
                (dot > 0.0).then(|| ScoredDocument {
                    id: doc.id.clone(),
                    score: dot / (doc.norm * query_norm),
                    content: doc.content.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        hits
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query is empty".into()));
        }
        Ok(self.rank(query, top_k))
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut terms = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

fn vector_norm(terms: &HashMap<String, f64>) -> f64 {
    terms.values().map(|w| w * w).sum::<f64>().sqrt()
}
