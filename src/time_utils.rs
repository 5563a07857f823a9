// SPDX-License-Identifier: MIT

//! Shared helpers for minute-quantized time arithmetic.
//!
//! All scheduling comparisons in this crate happen on whole minutes since
//! the Unix epoch, so sub-minute jitter between scheduler runs and client
//! writes never causes spurious re-triggers.

use chrono::{DateTime, Utc};

/// Floor a timestamp to whole elapsed minutes since the Unix epoch.
pub fn epoch_minutes(t: DateTime<Utc>) -> i64 {
    t.timestamp().div_euclid(60)
}

/// The minute at which the next check-in becomes due.
pub fn window_start(last_checkin_min: i64, interval_min: i64) -> i64 {
    last_checkin_min + interval_min
}
