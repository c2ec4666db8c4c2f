use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token accounting for one generation call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Estimate usage for providers that do not report it (~4 characters per token)
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        Self {
            prompt_tokens: estimate_tokens(prompt),
            completion_tokens: estimate_tokens(completion),
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

/// Result of a successful generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
    /// Cost in provider currency, when the provider reports it
    pub cost: Option<f64>,
    #[serde(with = "secs_f64")]
    pub latency: Duration,
}

impl Generation {
    pub fn new(text: String, usage: Usage, latency: Duration) -> Self {
        Self {
            text,
            usage,
            cost: None,
            latency,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Reported cost, or a per-1k-token estimate when the provider reports none
    pub fn cost_or_estimate(&self, cost_per_1k_tokens: Option<f64>) -> f64 {
        match (self.cost, cost_per_1k_tokens) {
            (Some(cost), _) => cost,
            (None, Some(rate)) => self.usage.total() as f64 / 1000.0 * rate,
            (None, None) => 0.0,
        }
    }
}

/// One retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub score: f64,
    pub content: String,
}

mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
