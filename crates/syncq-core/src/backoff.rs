//! Retry scheduling for failed queue rows.
//!
//! A row that fails with budget left is pushed back by `2^retry_count`
//! minutes, where `retry_count` is the count *after* the failed attempt was
//! recorded. The delay is uncapped unless a cap is configured.

use chrono::{DateTime, Duration, Utc};

/// Exponents above this saturate; `2^30` minutes is already ~2000 years.
const MAX_EXPONENT: u32 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Upper bound on a single delay, in minutes. `None` means uncapped.
    pub max_delay_minutes: Option<u32>,
}

impl BackoffPolicy {
    #[must_use]
    pub fn uncapped() -> Self {
        Self {
            max_delay_minutes: None,
        }
    }

    #[must_use]
    pub fn capped(max_delay_minutes: u32) -> Self {
        Self {
            max_delay_minutes: Some(max_delay_minutes),
        }
    }

    /// Delay in whole minutes before the attempt numbered `retry_count`.
    #[must_use]
    pub fn delay_minutes(&self, retry_count: i32) -> i64 {
        let exponent = u32::try_from(retry_count.max(0))
            .unwrap_or(0)
            .min(MAX_EXPONENT);
        let minutes = 1_i64 << exponent;
        match self.max_delay_minutes {
            Some(cap) => minutes.min(i64::from(cap)),
            None => minutes,
        }
    }

    /// Next eligible time for a row whose retry counter just became `retry_count`.
    #[must_use]
    pub fn next_attempt_at(&self, now: DateTime<Utc>, retry_count: i32) -> DateTime<Utc> {
        let delay = Duration::minutes(self.delay_minutes(retry_count));
        now.checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
