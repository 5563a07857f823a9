// SPDX-License-Identifier: MIT

//! Emergency contact link model.
//!
//! A contact link lives in a subcollection under the user being tracked. It
//! is created by the invite/accept flow; the scheduler only mutates the
//! bookkeeping fields (`last_notified_at`, `last_window_start_min`,
//! `sent_count_in_window`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emergency contact link stored under `users/{uid}/emergency_contacts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactLink {
    /// Link ID (also used as document ID)
    pub link_id: String,
    /// Canonical identity of a registered contact, if they have an account
    #[serde(default)]
    pub emergency_contact_uid: Option<String>,
    /// Raw fallback push tokens for a contact without an account
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    /// `"immediate"` or `"delay"`; anything else behaves as immediate
    #[serde(default)]
    pub notify_policy: Option<String>,
    /// Minutes to wait after the user's due minute (delay policy only)
    #[serde(default)]
    pub delay_minutes: Option<serde_json::Value>,
    /// Repeat interval in minutes; 0/absent disables repeats
    #[serde(default)]
    pub repeat_every_minutes: Option<serde_json::Value>,
    /// Max sends per miss window when repeats are enabled
    #[serde(default)]
    pub max_repeats_per_window: Option<serde_json::Value>,

    // Scheduler-owned bookkeeping
    #[serde(default)]
    pub last_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_window_start_min: Option<i64>,
    #[serde(default)]
    pub sent_count_in_window: Option<u32>,
}

/// Bookkeeping fields merge-written onto a contact link after a confirmed
/// delivery. Written only when at least one channel accepted the send, so a
/// transient outage never consumes a repeat slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactBookkeeping {
    pub last_notified_at: DateTime<Utc>,
    pub last_window_start_min: i64,
    pub sent_count_in_window: u32,
}
