// SPDX-License-Identifier: MIT

//! Push delivery port and the FCM HTTP v1 implementation.
//!
//! The scheduler only needs one primitive: send a payload to one token and
//! learn whether the token is permanently dead. Everything else (retries,
//! bookkeeping) is the caller's business.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Notification payload sent to a single device token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Why a single send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    /// The token is permanently invalid; the owning device record should go.
    DeadToken,
    /// Anything else; the send may succeed on a later tick.
    Transient,
}

/// Failure of a single send attempt.
#[derive(Debug, thiserror::Error)]
#[error("push send failed ({kind:?}): {message}")]
pub struct SendError {
    pub kind: SendErrorKind,
    pub message: String,
}

impl SendError {
    pub fn dead_token(message: impl Into<String>) -> Self {
        Self {
            kind: SendErrorKind::DeadToken,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: SendErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn is_dead_token(&self) -> bool {
        self.kind == SendErrorKind::DeadToken
    }
}

/// Push transport port. Implemented by [`FcmClient`] in production and by an
/// in-memory fake in the integration tests.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> std::result::Result<(), SendError>;
}

const METADATA_TOKEN_PATH: &str =
    "/computeMetadata/v1/instance/service-accounts/default/token";
/// Refresh the cached access token this long before it actually expires.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// FCM HTTP v1 client.
///
/// Authenticates with an access token from the GCE metadata server (the
/// identity Cloud Run gives the service), cached until shortly before expiry.
pub struct FcmClient {
    http: reqwest::Client,
    base_url: String,
    metadata_url: String,
    project_id: String,
    token: RwLock<Option<CachedToken>>,
}

impl FcmClient {
    pub fn new(project_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://fcm.googleapis.com".to_string(),
            metadata_url: "http://metadata.google.internal".to_string(),
            project_id: project_id.to_string(),
            token: RwLock::new(None),
        }
    }

    /// Override endpoints, for tests against a local HTTP stub.
    #[doc(hidden)]
    pub fn with_endpoints(mut self, base_url: &str, metadata_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.metadata_url = metadata_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch (or reuse) the service account access token.
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(t) = cached.as_ref() {
                if t.expires_at > Utc::now() {
                    return Ok(t.access_token.clone());
                }
            }
        }

        let url = format!("{}{}", self.metadata_url, METADATA_TOKEN_PATH);
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AppError::Push(format!("Metadata token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Push(format!(
                "Metadata token request returned status {}",
                response.status()
            )));
        }

        let token: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Push(format!("Invalid metadata token response: {}", e)))?;

        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now()
                + Duration::seconds((token.expires_in - TOKEN_EXPIRY_SLACK_SECS).max(0)),
        };
        *self.token.write().await = Some(cached);

        Ok(token.access_token)
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(&self, token: &str, message: &PushMessage) -> std::result::Result<(), SendError> {
        let access_token = self
            .access_token()
            .await
            .map_err(|e| SendError::transient(e.to_string()))?;

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        );

        let body = serde_json::json!({
            "message": {
                "token": token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
                "android": { "priority": "high" },
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::transient(format!("FCM request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_fcm_error(status.as_u16(), &body))
    }
}

/// Map an FCM error response to a send error kind.
///
/// `UNREGISTERED` (404) and malformed-token `INVALID_ARGUMENT` responses mean
/// the token will never work again; everything else is worth retrying.
fn classify_fcm_error(status: u16, body: &str) -> SendError {
    let dead = status == 404
        || body.contains("UNREGISTERED")
        || (status == 400 && body.contains("INVALID_ARGUMENT"));

    if dead {
        SendError::dead_token(format!("FCM status {}: {}", status, body))
    } else {
        SendError::transient(format!("FCM status {}: {}", status, body))
    }
}
