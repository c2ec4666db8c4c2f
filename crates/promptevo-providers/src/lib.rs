//! # promptevo-providers
//!
//! External collaborators consumed by the optimization engine.
//!
//! - [`Generator`] - text generation (candidate responses, judging, rewrites)
//! - [`Retriever`] - similarity search over a document store
//! - [`CommandGenerator`] - generator backed by an LLM CLI process
//! - [`KeywordRetriever`] - in-memory term-overlap retriever
//! - [`RateLimitedGenerator`] - pacing wrapper for any generator, sharing a [`Pacer`] across roles

mod command;
mod output;
mod rate_limit;
mod retrieval;
mod spawner;
mod traits;

pub use command::{classify_failure, CommandGenerator};
pub use output::{estimate_tokens, Generation, ScoredDocument, Usage};
pub use rate_limit::{Pacer, RateLimit, RateLimitedGenerator};
pub use retrieval::KeywordRetriever;
pub use spawner::{ProcessOutput, ProcessSpawner};
pub use traits::{
    GenerateOptions, Generator, GeneratorKind, LlmError, RetrievalError, Retriever,
};
