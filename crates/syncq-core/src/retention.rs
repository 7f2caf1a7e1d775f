//! Time windows over queue rows: how long terminal rows are kept, and how
//! long a `processing` claim may sit before it counts as abandoned.
//!
//! Both cutoffs are computed with checked arithmetic. A window too large to
//! represent yields `None` and callers skip the sweep.

use chrono::{DateTime, TimeDelta, Utc};

/// Largest accepted retention window (about a century).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Largest accepted claim lease (one week).
pub const MAX_CLAIM_LEASE_MINUTES: u32 = 7 * 24 * 60;

/// Terminal rows last updated before the returned instant are purgeable.
#[must_use]
pub fn retention_cutoff(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days)).and_then(|window| now.checked_sub_signed(window))
}

/// `processing` rows claimed before the returned instant are stale.
#[must_use]
pub fn lease_cutoff(now: DateTime<Utc>, minutes: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_minutes(i64::from(minutes)).and_then(|lease| now.checked_sub_signed(lease))
}
