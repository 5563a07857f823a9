// SPDX-License-Identifier: MIT

//! Task handler routes for Cloud Scheduler triggers.
//!
//! These endpoints are called by Cloud Scheduler on a fixed cadence, not
//! directly by users.

use crate::services::MissedCheckinScanner;
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Router};
use std::sync::Arc;

/// Task handler routes (called by Cloud Scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/scan-missed-checkins", post(scan_missed_checkins))
}

/// Run one missed-check-in scan.
///
/// Per-user failures are contained inside the scan; only a page-fetch
/// failure returns 500 so the scheduling platform records the invocation as
/// failed. The next tick re-scans from the beginning, which is safe because
/// all effects are idempotent within a miss window.
async fn scan_missed_checkins(State(state): State<Arc<AppState>>) -> StatusCode {
    let scanner = MissedCheckinScanner::new(state.store.clone(), state.push.clone())
        .with_page_size(state.config.scan_page_size);

    match scanner.run(chrono::Utc::now()).await {
        Ok(summary) => {
            tracing::info!(
                users_scanned = summary.users_scanned,
                users_notified = summary.users_notified,
                contacts_notified = summary.contacts_notified,
                users_failed = summary.users_failed,
                "Scan invocation finished"
            );
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(error = %e, "Scan aborted on page fetch failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
