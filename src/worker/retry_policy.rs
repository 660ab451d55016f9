//! Retry policy for failed jobs.
//!
//! Implements exponential backoff with configurable parameters.

use super::error::ProcessError;
use crate::config::WorkerSettings;
use chrono::{DateTime, Duration, TimeDelta, Utc};

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Claims allowed before a failure becomes permanent.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt, in seconds.
    pub initial_backoff_secs: u64,
    /// Cap for exponential growth, in seconds.
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &WorkerSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_backoff_secs: settings.retry.initial_backoff_secs,
            max_backoff_secs: settings.retry.max_backoff_secs,
            backoff_multiplier: settings.retry.backoff_multiplier,
        }
    }

    /// Backoff in seconds after a job failed on its `attempts`-th claim.
    ///
    /// `initial * multiplier^(attempts - 1)`, capped at `max_backoff_secs`.
    pub fn backoff_secs(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_secs as f64) as u64
    }

    /// When a job that failed on its `attempts`-th claim becomes eligible again.
    ///
    /// A backoff too large to represent pushes the job to the latest
    /// representable instant, never earlier than `now`.
    pub fn next_retry_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.backoff_secs(attempts))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|backoff| now.checked_add_signed(backoff))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns true if the error is retryable and the job has claims left.
    pub fn should_retry(&self, error: &ProcessError, attempts: u32) -> bool {
        error.is_retryable() && attempts < self.max_attempts
    }

    /// True for jobs claimed more often than allowed.
    pub fn attempts_exceeded(&self, attempts: u32) -> bool {
        attempts > self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&WorkerSettings::default())
    }
}
