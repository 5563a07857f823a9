// SPDX-License-Identifier: MIT

//! User and device models for storage.

use crate::time_utils::epoch_minutes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Check-in user record stored in Firestore.
///
/// Policy-bearing fields (`checkin_interval`, `due_at_min`) are kept as raw
/// JSON values because client writes are not trusted to be well-typed; they
/// are coerced at read time so a malformed value can never drop an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinUser {
    /// User ID (also used as document ID)
    pub uid: String,
    /// Whether this user participates in the overdue scan
    #[serde(default)]
    pub checkin_enabled: bool,
    /// Display name, used in alerts sent to emergency contacts
    #[serde(default)]
    pub display_name: Option<String>,
    /// Authoritative last check-in confirmation
    #[serde(default)]
    pub last_checkin_at: Option<DateTime<Utc>>,
    /// Check-in interval in minutes (loose; effective value falls back to 720)
    #[serde(default)]
    pub checkin_interval: Option<serde_json::Value>,
    /// Precomputed due minute-epoch; authoritative when present and finite
    #[serde(default)]
    pub due_at_min: Option<serde_json::Value>,
    /// Set once the user has been notified for the current miss window
    #[serde(default)]
    pub missed_notified_at: Option<DateTime<Utc>>,
}

impl CheckinUser {
    /// Effective due minute for this user.
    ///
    /// The precomputed `due_at_min` wins when present and finite; otherwise
    /// the due minute is derived from `last_checkin_at` plus the effective
    /// interval. Returns `None` only when neither source is usable.
    pub fn effective_due_min(&self) -> Option<i64> {
        if let Some(due) = crate::services::policy::coerce_minutes(self.due_at_min.as_ref()) {
            return Some(due);
        }

        let last = self.last_checkin_at?;
        let interval = crate::services::policy::effective_interval_min(self.checkin_interval.as_ref());
        Some(crate::time_utils::window_start(epoch_minutes(last), interval))
    }

    /// Whether `missed_notified_at` already covers the given due minute.
    pub fn notified_for_window(&self, due_min: i64) -> bool {
        self.missed_notified_at
            .map(|at| epoch_minutes(at) >= due_min)
            .unwrap_or(false)
    }
}

/// A registered push device, stored as a subcollection document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Device ID (also used as document ID)
    pub device_id: String,
    /// Push token for the transport
    pub token: String,
}
