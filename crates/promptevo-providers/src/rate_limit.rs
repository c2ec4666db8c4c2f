use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::trace;

use crate::{GenerateOptions, Generation, Generator, LlmError};

/// Pacing policy applied to every call of a wrapped generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum calls in flight at once
    pub max_concurrent: usize,
    /// Minimum spacing between the start of consecutive calls
    pub min_interval: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            min_interval: Duration::ZERO,
        }
    }
}

impl RateLimit {
    pub fn unlimited() -> Self {
        Self {
            max_concurrent: Semaphore::MAX_PERMITS,
            min_interval: Duration::ZERO,
        }
    }
}

/// Concurrency permits and start-slot schedule for one provider.
///
/// Clones share state, so generators built from the same pacer are limited
/// together.
#[derive(Debug, Clone)]
pub struct Pacer {
    permits: Arc<Semaphore>,
    min_interval: Duration,
    next_start: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max_concurrent.max(1))),
            min_interval: limit.min_interval,
            next_start: Arc::new(Mutex::new(None)),
        }
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Reserve the next start slot and sleep until it arrives
    async fn wait_for_slot(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let wake_at = {
            let mut next = self.next_start.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        trace!(
            wait_ms = wake_at.saturating_duration_since(Instant::now()).as_millis(),
            "Pacing generator call"
        );
        tokio::time::sleep_until(wake_at).await;
    }
}

/// Wraps a generator with a concurrency cap and a minimum call interval
pub struct RateLimitedGenerator {
    inner: Arc<dyn Generator>,
    pacer: Pacer,
}

impl RateLimitedGenerator {
    /// Limit `inner` on its own
    pub fn new(inner: Arc<dyn Generator>, limit: RateLimit) -> Self {
        Self::with_pacer(inner, Pacer::new(limit))
    }

    /// Limit `inner` together with every other generator using `pacer`
    pub fn with_pacer(inner: Arc<dyn Generator>, pacer: Pacer) -> Self {
        Self { inner, pacer }
    }
}

#[async_trait]
impl Generator for RateLimitedGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        let _permit = self
            .pacer
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Server("rate limiter closed".into()))?;
        self.pacer.wait_for_slot().await;
        self.inner.generate(prompt, options).await
    }
}
