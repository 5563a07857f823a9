// SPDX-License-Identifier: MIT

//! Per-contact escalation engine.
//!
//! Eligibility is re-derived from stored bookkeeping on every scan, so the
//! engine carries no state of its own. Bookkeeping is persisted only after a
//! confirmed delivery: a transient outage never consumes a repeat slot and
//! never advances the window counters.

use crate::db::{CheckinStore, DeviceHome};
use crate::error::Result;
use crate::models::{CheckinUser, ContactBookkeeping, ContactLink};
use crate::services::delivery::{send_to_devices, send_to_raw_tokens};
use crate::services::policy::{normalize_contact_policy, ContactPolicy};
use crate::services::push::{PushGateway, PushMessage};
use crate::time_utils::epoch_minutes;
use chrono::{DateTime, Utc};

/// Outcome of evaluating one contact against one miss window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEligibility {
    /// The contact's delayed window has not started yet.
    NotDue { window_start_min: i64 },
    /// The per-window send cap is exhausted.
    Capped { window_start_min: i64, sent_count: u32 },
    /// A send happened recently; the next repeat is not due yet.
    AwaitingRepeat { next_eligible_min: i64 },
    /// A send should be attempted now.
    Eligible(EligibleSend),
}

/// Parameters of an eligible send, carried through to bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleSend {
    pub window_start_min: i64,
    /// Whether the stored counters belong to this window.
    pub same_window: bool,
    /// Sends already confirmed in this window (0 when the window is new).
    pub sent_count: u32,
}

/// Evaluate a contact's eligibility for the miss window starting at
/// `due_min`, as seen at `now_min`.
///
/// Stored counters belonging to an older window are treated as reset but are
/// not mutated here; they are only overwritten when a send actually lands.
pub fn evaluate_contact(
    link: &ContactLink,
    policy: &ContactPolicy,
    due_min: i64,
    now_min: i64,
) -> ContactEligibility {
    let window_start_min = due_min + policy.delay_min;

    if now_min < window_start_min {
        return ContactEligibility::NotDue { window_start_min };
    }

    let same_window = link.last_window_start_min == Some(window_start_min);
    let sent_count = if same_window {
        link.sent_count_in_window.unwrap_or(0)
    } else {
        0
    };

    if sent_count >= policy.max_repeats {
        return ContactEligibility::Capped {
            window_start_min,
            sent_count,
        };
    }

    let next_eligible_min = if sent_count == 0 {
        window_start_min
    } else if policy.repeats_enabled() {
        link.last_notified_at
            .map(epoch_minutes)
            .unwrap_or(window_start_min)
            + policy.repeat_every_min
    } else {
        // Repeats disabled with a prior send is unreachable: the cap of 1 is
        // exhausted above. Guard anyway.
        i64::MAX
    };

    if now_min < next_eligible_min {
        return ContactEligibility::AwaitingRepeat { next_eligible_min };
    }

    ContactEligibility::Eligible(EligibleSend {
        window_start_min,
        same_window,
        sent_count,
    })
}

/// Alert payload sent to an emergency contact.
fn contact_alert_message(user: &CheckinUser) -> PushMessage {
    let who = user.display_name.as_deref().unwrap_or("Your contact");
    PushMessage::new(
        "Safety alert",
        format!("{} missed their safety check-in.", who),
    )
    .with_data("type", "contact_alert")
    .with_data("main_user_uid", user.uid.clone())
}

/// Evaluate one contact and, if eligible, attempt delivery and persist the
/// window bookkeeping.
///
/// Returns `true` when at least one channel accepted the send.
pub async fn notify_contact(
    store: &dyn CheckinStore,
    push: &dyn PushGateway,
    user: &CheckinUser,
    link: &ContactLink,
    due_min: i64,
    now_min: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let policy = normalize_contact_policy(link);

    let eligible = match evaluate_contact(link, &policy, due_min, now_min) {
        ContactEligibility::Eligible(e) => e,
        ContactEligibility::NotDue { window_start_min } => {
            tracing::debug!(
                uid = %user.uid,
                link_id = %link.link_id,
                window_start_min,
                now_min,
                "Contact window not started"
            );
            return Ok(false);
        }
        ContactEligibility::Capped {
            window_start_min,
            sent_count,
        } => {
            tracing::debug!(
                uid = %user.uid,
                link_id = %link.link_id,
                window_start_min,
                sent_count,
                max_repeats = policy.max_repeats,
                "Contact capped for this window"
            );
            return Ok(false);
        }
        ContactEligibility::AwaitingRepeat { next_eligible_min } => {
            tracing::debug!(
                uid = %user.uid,
                link_id = %link.link_id,
                next_eligible_min,
                now_min,
                "Contact repeat not due yet"
            );
            return Ok(false);
        }
    };

    let message = contact_alert_message(user);
    let delivered = resolve_and_send(store, push, user, link, &message).await?;

    if delivered == 0 {
        // No channel accepted anything; leave the counters untouched so the
        // contact stays eligible on the next tick.
        tracing::warn!(
            uid = %user.uid,
            link_id = %link.link_id,
            window_start_min = eligible.window_start_min,
            "No channel delivered for contact"
        );
        return Ok(false);
    }

    let bookkeeping = ContactBookkeeping {
        last_notified_at: now,
        last_window_start_min: eligible.window_start_min,
        sent_count_in_window: if eligible.same_window {
            eligible.sent_count + 1
        } else {
            1
        },
    };

    store
        .record_contact_send(&user.uid, &link.link_id, &bookkeeping)
        .await?;

    tracing::info!(
        uid = %user.uid,
        link_id = %link.link_id,
        delivered,
        delay_min = policy.delay_min,
        repeat_every_min = policy.repeat_every_min,
        sent_count = bookkeeping.sent_count_in_window,
        max_repeats = policy.max_repeats,
        window_start_min = eligible.window_start_min,
        "Contact notified"
    );

    Ok(true)
}

/// Resolve a delivery channel in priority order; the first channel that
/// accepts at least one send wins and later channels are never attempted.
async fn resolve_and_send(
    store: &dyn CheckinStore,
    push: &dyn PushGateway,
    user: &CheckinUser,
    link: &ContactLink,
    message: &PushMessage,
) -> Result<u32> {
    // 1. Devices of the registered contact identity.
    if let Some(contact_uid) = &link.emergency_contact_uid {
        if let Some(doc_id) = store.find_contact_identity(contact_uid).await? {
            let devices = store.contact_identity_devices(&doc_id).await?;
            let home = DeviceHome::ContactIdentity { doc_id };
            let delivered = send_to_devices(push, store, &home, &devices, message).await;
            if delivered > 0 {
                return Ok(delivered);
            }
        }
    }

    // 2. Raw fallback tokens on the link itself.
    if let Some(tokens) = &link.tokens {
        if !tokens.is_empty() {
            let delivered =
                send_to_raw_tokens(push, store, &user.uid, &link.link_id, tokens, message).await;
            if delivered > 0 {
                return Ok(delivered);
            }
        }
    }

    // 3. Legacy per-link device location.
    let devices = store.legacy_contact_devices(&user.uid, &link.link_id).await?;
    if devices.is_empty() {
        return Ok(0);
    }
    let home = DeviceHome::LegacyContact {
        owner_uid: user.uid.clone(),
        link_id: link.link_id.clone(),
    };
    Ok(send_to_devices(push, store, &home, &devices, message).await)
}
