//! Retry policy applied to a node's execute stage.
//!
//! The policy only computes attempt limits and waits; the loop that applies
//! it lives with the lifecycle stages so that every node kind (plain, batch
//! item) retries the same way.
use std::time::Duration;

use rand::Rng;

/// Strategy for computing backoff durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Delay = wait
    #[default]
    Constant,
    /// Delay = wait * attempt_count
    Linear,
    /// Delay = wait * 2^(attempt_count - 1)
    Exponential,
}

/// Policy controlling retry behavior for nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first), at least 1.
    pub max_attempts: usize,
    /// Base wait between attempts.
    pub wait: Duration,
    /// Maximum wait allowed.
    pub max_wait: Duration,
    /// Strategy to compute waits.
    pub strategy: BackoffStrategy,
    /// Optional upper bound of a random jitter added to each wait.
    pub jitter: Option<Duration>,
}

impl Default for RetryPolicy {
    /// A single attempt, no waiting.
    fn default() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl RetryPolicy {
    /// Constant-wait policy: up to `max_attempts` attempts, `wait` between them.
    pub fn new(max_attempts: usize, wait: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            wait,
            max_wait: Duration::MAX,
            strategy: BackoffStrategy::Constant,
            jitter: None,
        }
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Add a random jitter in `[0, jitter]` to each wait.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Effective attempt limit.
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Whether another attempt follows a failure of `attempt` (1-based).
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.attempts()
    }

    /// Compute the wait after the failed attempt `attempt` (1-based).
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Constant => self.wait,
            BackoffStrategy::Linear => self.wait.saturating_mul(attempt as u32),
            BackoffStrategy::Exponential => {
                // Compute 2^(attempt-1) with shift, saturating at 32 bits
                let exp = attempt.saturating_sub(1);
                let factor = if exp < 32 { 1_u32 << exp } else { u32::MAX };
                self.wait.saturating_mul(factor)
            }
        };
        let capped = base.min(self.max_wait);
        match self.jitter {
            Some(j) if !j.is_zero() => {
                let bound = u64::try_from(j.as_nanos()).unwrap_or(u64::MAX);
                let extra = rand::thread_rng().gen_range(0..=bound);
                capped.saturating_add(Duration::from_nanos(extra))
            }
            _ => capped,
        }
    }
}
