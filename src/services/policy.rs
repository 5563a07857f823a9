// SPDX-License-Identifier: MIT

//! Normalization of stored notification-policy fields.
//!
//! Client apps write these fields and cannot be trusted to keep them
//! well-typed. Every function here is total: malformed input degrades to a
//! documented default instead of raising, because a missed-check-in alert
//! must never be dropped by a bad config value.

use crate::models::ContactLink;
use serde_json::Value;

/// Effective check-in interval when the stored value is absent or unusable.
pub const DEFAULT_INTERVAL_MIN: i64 = 720;

/// Default send cap per miss window when repeats are enabled.
pub const DEFAULT_MAX_REPEATS: u32 = 3;

/// Coerce a loose stored value to whole minutes.
///
/// Accepts integers, finite floats (floored), and numeric strings. Anything
/// else yields `None`.
pub fn coerce_minutes(raw: Option<&Value>) -> Option<i64> {
    match raw? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64)
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.floor() as i64),
        _ => None,
    }
}

/// Effective check-in interval in minutes; falls back to 720.
pub fn effective_interval_min(raw: Option<&Value>) -> i64 {
    match coerce_minutes(raw) {
        Some(v) if v > 0 => v,
        _ => DEFAULT_INTERVAL_MIN,
    }
}

/// Fully-normalized operating parameters for one contact link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactPolicy {
    /// Minutes after the user's due minute before the first send
    pub delay_min: i64,
    /// Minutes between repeats; 0 means a single send per window
    pub repeat_every_min: i64,
    /// Sends allowed per miss window
    pub max_repeats: u32,
}

impl ContactPolicy {
    /// Whether repeated sends within a window are enabled.
    pub fn repeats_enabled(&self) -> bool {
        self.repeat_every_min > 0
    }
}

/// Derive safe operating parameters from the raw stored link fields.
pub fn normalize_contact_policy(link: &ContactLink) -> ContactPolicy {
    let is_delay = link.notify_policy.as_deref() == Some("delay");

    // Delay only applies under the "delay" policy; non-positive values mean 0.
    let delay_min = if is_delay {
        coerce_minutes(link.delay_minutes.as_ref())
            .filter(|d| *d > 0)
            .unwrap_or(0)
    } else {
        0
    };

    let repeat_every_min = coerce_minutes(link.repeat_every_minutes.as_ref())
        .filter(|r| *r > 0)
        .unwrap_or(0);

    let max_repeats = if repeat_every_min > 0 {
        coerce_minutes(link.max_repeats_per_window.as_ref())
            .filter(|m| *m >= 1)
            .map(|m| m as u32)
            .unwrap_or(DEFAULT_MAX_REPEATS)
    } else {
        // No repeats: the cap is hard-fixed to a single send.
        1
    };

    ContactPolicy {
        delay_min,
        repeat_every_min,
        max_repeats,
    }
}
