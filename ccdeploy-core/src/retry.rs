//! Retry policy values.
//!
//! These are plain configuration data. The executor that sleeps and re-runs
//! operations lives in `ccdeploy-engine`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay applied between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// The same delay after every failed attempt.
    Fixed { delay_ms: u64 },
    /// `step_ms * n` after the n-th failed attempt.
    Linear { step_ms: u64 },
}

impl Backoff {
    /// Delay to wait after `failed_attempt` (1-based) before trying again.
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Linear { step_ms } => {
                Duration::from_millis(step_ms.saturating_mul(u64::from(failed_attempt.max(1))))
            }
        }
    }
}

/// Bounded retry budget for one kind of network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Must be at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// A single attempt. Used for writes that must not be repeated blindly.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed { delay_ms: 0 },
        }
    }

    /// Peer membership views lag; discovery gets a longer budget.
    pub const fn discovery_default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Backoff::Fixed { delay_ms: 500 },
        }
    }

    pub const fn network_default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Linear { step_ms: 500 },
        }
    }
}

/// Retry budgets per call family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Local-peer discovery until the quorum is met.
    #[serde(default = "RetryPolicy::discovery_default")]
    pub discovery: RetryPolicy,
    /// Queries and idempotent writes (join, install, upgrade).
    #[serde(default = "RetryPolicy::network_default")]
    pub network: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            discovery: RetryPolicy::discovery_default(),
            network: RetryPolicy::network_default(),
        }
    }
}
