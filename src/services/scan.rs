// SPDX-License-Identifier: MIT

//! Missed check-in scan.
//!
//! Pages through overdue users in ascending due order, notifies each user on
//! their own devices once per miss window, then escalates to their emergency
//! contacts. One bad record never starves the rest of the scan: failures are
//! caught at the per-user boundary. Only a page-fetch failure aborts the
//! invocation, and the next scheduled tick re-scans from the beginning.

use crate::config::DEFAULT_SCAN_PAGE_SIZE;
use crate::db::{CheckinStore, DeviceHome, ScanCursor};
use crate::error::Result;
use crate::models::CheckinUser;
use crate::services::delivery::send_to_devices;
use crate::services::escalation::notify_contact;
use crate::services::policy;
use crate::services::push::{PushGateway, PushMessage};
use crate::time_utils::epoch_minutes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Counters reported by one scan invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Users returned by the overdue query.
    pub users_scanned: u32,
    /// Users whose missed-check-in marker was written this run.
    pub users_notified: u32,
    /// Contact sends confirmed this run.
    pub contacts_notified: u32,
    /// Users whose processing failed and was skipped.
    pub users_failed: u32,
}

/// Drives one scan over all overdue users.
pub struct MissedCheckinScanner {
    store: Arc<dyn CheckinStore>,
    push: Arc<dyn PushGateway>,
    page_size: u32,
}

impl MissedCheckinScanner {
    pub fn new(store: Arc<dyn CheckinStore>, push: Arc<dyn PushGateway>) -> Self {
        Self {
            store,
            push,
            page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Run one full scan as of `now`.
    ///
    /// Page-fetch failures propagate; everything else is contained per user.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ScanSummary> {
        let now_min = epoch_minutes(now);
        let mut summary = ScanSummary::default();
        let mut cursor: Option<ScanCursor> = None;

        loop {
            let page = self
                .store
                .overdue_users_page(now_min, self.page_size, cursor.as_ref())
                .await?;
            let fetched = page.len();

            for user in &page {
                summary.users_scanned += 1;

                match self.process_user(user, now, now_min).await {
                    Ok(outcome) => {
                        if outcome.user_notified {
                            summary.users_notified += 1;
                        }
                        summary.contacts_notified += outcome.contacts_notified;
                    }
                    Err(e) => {
                        summary.users_failed += 1;
                        tracing::error!(
                            uid = %user.uid,
                            error = %e,
                            "Failed to process overdue user, continuing scan"
                        );
                    }
                }

                // Cursor advances past every iterated document, including
                // failed ones. The stored due minute is what the query
                // ordered on, so it is always coercible here.
                cursor = Some(ScanCursor {
                    due_at_min: policy::coerce_minutes(user.due_at_min.as_ref())
                        .or_else(|| user.effective_due_min())
                        .unwrap_or(now_min),
                    uid: user.uid.clone(),
                });
            }

            // A short page signals exhaustion.
            if fetched < self.page_size as usize {
                break;
            }
        }

        tracing::info!(
            users_scanned = summary.users_scanned,
            users_notified = summary.users_notified,
            contacts_notified = summary.contacts_notified,
            users_failed = summary.users_failed,
            "Missed check-in scan complete"
        );

        Ok(summary)
    }

    async fn process_user(
        &self,
        user: &CheckinUser,
        now: DateTime<Utc>,
        now_min: i64,
    ) -> Result<UserOutcome> {
        let mut outcome = UserOutcome::default();

        let Some(due_min) = user.effective_due_min() else {
            tracing::debug!(uid = %user.uid, "No usable due minute, skipping");
            return Ok(outcome);
        };

        // Re-check due-ness against the effective due minute; the stored
        // field the query matched on may be stale.
        if now_min < due_min {
            tracing::debug!(uid = %user.uid, due_min, now_min, "Not overdue yet, skipping");
            return Ok(outcome);
        }

        outcome.user_notified = self.notify_main_user(user, due_min, now).await?;

        let contacts = self.store.emergency_contacts(&user.uid).await?;
        for link in &contacts {
            if notify_contact(
                self.store.as_ref(),
                self.push.as_ref(),
                user,
                link,
                due_min,
                now_min,
                now,
            )
            .await?
            {
                outcome.contacts_notified += 1;
            }
        }

        Ok(outcome)
    }

    /// Push the missed-check-in alert to the user's own devices, at most once
    /// per miss window.
    ///
    /// A user with zero devices is left unmarked so a device registering
    /// shortly after still gets this window's alert on a later tick.
    async fn notify_main_user(
        &self,
        user: &CheckinUser,
        due_min: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if user.notified_for_window(due_min) {
            tracing::debug!(uid = %user.uid, due_min, "Already notified for this window");
            return Ok(false);
        }

        let devices = self.store.user_devices(&user.uid).await?;
        if devices.is_empty() {
            tracing::debug!(uid = %user.uid, "No devices registered, not marking notified");
            return Ok(false);
        }

        let message = PushMessage::new(
            "Missed check-in",
            "You missed your scheduled check-in. Are you okay?",
        )
        .with_data("type", "missed_checkin");

        let home = DeviceHome::User {
            uid: user.uid.clone(),
        };
        let delivered = send_to_devices(
            self.push.as_ref(),
            self.store.as_ref(),
            &home,
            &devices,
            &message,
        )
        .await;

        // The marker is the sole gate against re-notifying this window. It
        // is written whenever devices existed, even if every send failed.
        self.store.mark_user_notified(&user.uid, now).await?;

        tracing::info!(
            uid = %user.uid,
            due_min,
            devices = devices.len(),
            delivered,
            "User notified of missed check-in"
        );

        Ok(true)
    }
}

#[derive(Debug, Default)]
struct UserOutcome {
    user_notified: bool,
    contacts_notified: u32,
}
