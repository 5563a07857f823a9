// SPDX-License-Identifier: MIT

//! Cloud Scheduler authentication middleware.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

/// Header Cloud Scheduler attaches to HTTP-target invocations.
const SCHEDULER_HEADER: &str = "x-cloudscheduler";

/// Require the Cloud Scheduler header for `/tasks/*` routes.
///
/// Cloud Run strips this header from external requests, so its presence
/// guarantees the request originated inside Google's infrastructure.
pub async fn require_scheduler_auth(request: Request, next: Next) -> Result<Response, StatusCode> {
    let header = request.headers().get(SCHEDULER_HEADER);
    let is_scheduler = header
        .and_then(|h| h.to_str().ok())
        .map(|v| v == "true")
        .unwrap_or(false);

    if !is_scheduler {
        tracing::warn!(
            header = ?header,
            "Blocked tasks request without scheduler header"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
