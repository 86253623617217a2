//! Bounded retry executor.
//!
//! [`run`] drives an operation under a [`RetryPolicy`]: a retryable failure
//! sleeps for the policy's backoff and tries again, anything else (or the last
//! allowed attempt) ends the loop. Sleeping goes through [`Sleeper`] so tests
//! can record delays instead of waiting.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ccdeploy_core::retry::RetryPolicy;

/// Source of delays between attempts.
pub trait Sleeper: fmt::Debug {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays without waiting. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
    }
}

/// The last error of an operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// Attempts made, including the first.
    pub attempts: u32,
    pub last: E,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. A policy with `max_attempts == 0`
/// still makes one attempt.
pub fn run<T, E, F, R>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    retryable: R,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
{
    let max = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max && retryable(&err) => {
                let delay = policy.backoff.delay(attempt);
                tracing::debug!(attempt, max, ?delay, "retrying after transient failure");
                sleeper.sleep(delay);
                attempt += 1;
            }
            Err(last) => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccdeploy_core::retry::Backoff;

    #[derive(Debug, PartialEq)]
    enum Fail {
        Soft,
        Hard,
    }

    fn policy(max_attempts: u32, backoff: Backoff) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff,
        }
    }

    fn soft(e: &Fail) -> bool {
        *e == Fail::Soft
    }

    #[test]
    fn succeeds_first_try_without_sleeping() {
        let sleeper = RecordingSleeper::new();
        let result: Result<u32, RetryExhausted<Fail>> = run(
            &policy(3, Backoff::Fixed { delay_ms: 10 }),
            &sleeper,
            soft,
            |attempt| Ok(attempt),
        );
        assert_eq!(result, Ok(1));
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn retries_soft_failures_until_success() {
        let sleeper = RecordingSleeper::new();
        let result = run(
            &policy(5, Backoff::Linear { step_ms: 100 }),
            &sleeper,
            soft,
            |attempt| if attempt < 3 { Err(Fail::Soft) } else { Ok("done") },
        );
        assert_eq!(result, Ok("done"));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn stops_at_max_attempts() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let result: Result<(), _> = run(
            &policy(4, Backoff::Fixed { delay_ms: 50 }),
            &sleeper,
            soft,
            |_| {
                calls += 1;
                Err(Fail::Soft)
            },
        );
        assert_eq!(
            result,
            Err(RetryExhausted {
                attempts: 4,
                last: Fail::Soft
            })
        );
        assert_eq!(calls, 4);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(50); 3]);
    }

    #[test]
    fn hard_failure_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let result: Result<(), _> = run(
            &policy(5, Backoff::Fixed { delay_ms: 50 }),
            &sleeper,
            soft,
            |_| Err(Fail::Hard),
        );
        assert_eq!(
            result,
            Err(RetryExhausted {
                attempts: 1,
                last: Fail::Hard
            })
        );
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn zero_attempt_policy_still_runs_once() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let _: Result<(), _> = run(
            &policy(0, Backoff::Fixed { delay_ms: 50 }),
            &sleeper,
            soft,
            |_| {
                calls += 1;
                Err(Fail::Soft)
            },
        );
        assert_eq!(calls, 1);
    }

    #[test]
    fn once_policy_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let result: Result<(), _> = run(&RetryPolicy::once(), &sleeper, soft, |_| Err(Fail::Soft));
        assert_eq!(result.unwrap_err().attempts, 1);
        assert!(sleeper.delays().is_empty());
    }
}
