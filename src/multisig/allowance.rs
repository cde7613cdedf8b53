//! Rolling daily allowance
//!
//! Tracks how much value left the wallet without quorum in the current
//! 24-hour window. The window resets lazily on the first spend attempt after
//! it elapsed, never on a timer, so [`DailyAllowance::spent`] may look stale
//! between windows but is always correct when consulted.

use crate::core::types::{amount_serde, Amount};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of an allowance window in hours
pub const WINDOW_HOURS: i64 = 24;

/// Daily spending allowance
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyAllowance {
    #[serde(with = "amount_serde")]
    limit: Amount,
    #[serde(with = "amount_serde")]
    spent: Amount,
    window_start: DateTime<Utc>,
}

impl DailyAllowance {
    /// Create an allowance whose first window opens at `now`
    pub fn new(limit: Amount, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            spent: 0,
            window_start: now,
        }
    }

    fn window_length() -> Duration {
        Duration::hours(WINDOW_HOURS)
    }

    fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_start + Self::window_length()
    }

    /// Reserve `amount` against the allowance
    ///
    /// Starts a fresh window first if the current one has elapsed. Commits
    /// and returns `true` if `spent + amount <= limit`, otherwise leaves the
    /// spent amount untouched and returns `false`.
    pub fn try_reserve(&mut self, amount: Amount, now: DateTime<Utc>) -> bool {
        if self.window_elapsed(now) {
            self.spent = 0;
            self.window_start = now;
        }

        match self.spent.checked_add(amount) {
            Some(total) if total <= self.limit => {
                self.spent = total;
                true
            }
            _ => false,
        }
    }

    /// Change the limit; the spent amount is kept
    pub fn set_limit(&mut self, limit: Amount) {
        self.limit = limit;
    }

    /// Zero the spent amount of the current window
    pub fn reset_spent(&mut self) {
        self.spent = 0;
    }

    /// Configured limit
    pub fn limit(&self) -> Amount {
        self.limit
    }

    /// Amount recorded as spent, as of the last spend attempt
    pub fn spent(&self) -> Amount {
        self.spent
    }

    /// Start of the current window
    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    /// What could still be spent at `now`, without touching state
    pub fn remaining(&self, now: DateTime<Utc>) -> Amount {
        if self.window_elapsed(now) {
            self.limit
        } else {
            self.limit.saturating_sub(self.spent)
        }
    }
}
