use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::{Generation, ScoredDocument};

/// Errors that can occur while invoking a text-generation provider
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Provider rejected credentials: {0}")]
    Auth(String),

    #[error("Provider rate limit hit: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider server error: {0}")]
    Server(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn provider process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Provider returned an unusable response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Whether the failure was a rejection by the provider rather than a bad payload
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LlmError::Auth(_) | LlmError::RateLimited { .. } | LlmError::Server(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Server(_) | LlmError::Timeout(_)
        )
    }
}

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Optional system preamble, prepended by adapters that have no native slot for it
    pub system: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            system: None,
        }
    }
}

impl GenerateOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Supported command-line generator presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    ClaudeCode,
    OpenCode,
    Custom,
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorKind::ClaudeCode => write!(f, "claude-code"),
            GeneratorKind::OpenCode => write!(f, "opencode"),
            GeneratorKind::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for GeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(GeneratorKind::ClaudeCode),
            "opencode" | "open-code" => Ok(GeneratorKind::OpenCode),
            "custom" => Ok(GeneratorKind::Custom),
            _ => Err(format!("Unknown generator type: {}", s)),
        }
    }
}

/// The text-generation collaborator, used for candidate responses, judging and rewrites
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable name of the provider
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, LlmError>;
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid retrieval query: {0}")]
    InvalidQuery(String),

    #[error("Failed to load documents: {0}")]
    Io(#[from] std::io::Error),
}

/// The document-store collaborator
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    /// Results are ordered by descending similarity
    async fn search(&self, query: &str, top_k: usize)
        -> Result<Vec<ScoredDocument>, RetrievalError>;
}
