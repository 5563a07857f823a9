// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides the store operations the scheduler needs:
//! - the overdue-user scan query (filtered, ordered, keyset-paginated)
//! - device / contact-link subcollection listings
//! - contact-identity resolution
//! - merge-writes for the notified marker and contact bookkeeping
//! - dead-token cleanup deletes

use crate::db::{collections, CheckinStore, DeviceHome, ScanCursor};
use crate::error::{AppError, Result};
use crate::models::{CheckinUser, ContactBookkeeping, ContactLink, Device};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::{FirestoreQueryCursor, FirestoreQueryDirection};
use serde::{Deserialize, Serialize};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Parent path for a user's subcollections.
    fn user_path(&self, uid: &str) -> Result<firestore::ParentPathBuilder> {
        self.get_client()?
            .parent_path(collections::USERS, uid)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Parent path for a contact link's subcollections (legacy devices).
    fn link_path(&self, owner_uid: &str, link_id: &str) -> Result<firestore::ParentPathBuilder> {
        self.user_path(owner_uid)?
            .at(collections::EMERGENCY_CONTACTS, link_id)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List devices under an arbitrary parent path.
    async fn devices_under(&self, parent: &firestore::ParentPathBuilder) -> Result<Vec<Device>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DEVICES)
            .parent(parent)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Projection of a contact-identity document carrying its document ID.
#[derive(Debug, Deserialize)]
struct ContactIdentityDoc {
    #[serde(alias = "_firestore_id")]
    doc_id: String,
}

/// Merge-write payload for the missed-check-in marker.
#[derive(Debug, Serialize, Deserialize)]
struct MissedNotifiedPatch {
    missed_notified_at: DateTime<Utc>,
}

#[async_trait]
impl CheckinStore for FirestoreStore {
    async fn overdue_users_page(
        &self,
        now_min: i64,
        page_size: u32,
        cursor: Option<&ScanCursor>,
    ) -> Result<Vec<CheckinUser>> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| {
                q.for_all([
                    q.field("checkin_enabled").eq(true),
                    q.field("due_at_min").less_than_or_equal(now_min),
                ])
            })
            .order_by([
                ("due_at_min", FirestoreQueryDirection::Ascending),
                ("uid", FirestoreQueryDirection::Ascending),
            ])
            .limit(page_size);

        let query = if let Some(c) = cursor {
            query.start_at(FirestoreQueryCursor::AfterValue(vec![
                c.due_at_min.into(),
                c.uid.clone().into(),
            ]))
        } else {
            query
        };

        query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn user_devices(&self, uid: &str) -> Result<Vec<Device>> {
        let parent = self.user_path(uid)?;
        self.devices_under(&parent).await
    }

    async fn emergency_contacts(&self, uid: &str) -> Result<Vec<ContactLink>> {
        let parent = self.user_path(uid)?;
        self.get_client()?
            .fluent()
            .select()
            .from(collections::EMERGENCY_CONTACTS)
            .parent(&parent)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_contact_identity(&self, contact_uid: &str) -> Result<Option<String>> {
        let contact_uid = contact_uid.to_string();
        let matches: Vec<ContactIdentityDoc> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::CONTACT_IDENTITIES)
            .filter(move |q| q.for_all([q.field("uid").eq(contact_uid.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.into_iter().next().map(|d| d.doc_id))
    }

    async fn contact_identity_devices(&self, doc_id: &str) -> Result<Vec<Device>> {
        let parent = self
            .get_client()?
            .parent_path(collections::CONTACT_IDENTITIES, doc_id)
            .map_err(|e| AppError::Database(e.to_string()))?;
        self.devices_under(&parent).await
    }

    async fn legacy_contact_devices(&self, owner_uid: &str, link_id: &str) -> Result<Vec<Device>> {
        let parent = self.link_path(owner_uid, link_id)?;
        self.devices_under(&parent).await
    }

    async fn delete_device(&self, home: &DeviceHome, device_id: &str) -> Result<()> {
        let parent = match home {
            DeviceHome::User { uid } => self.user_path(uid)?,
            DeviceHome::ContactIdentity { doc_id } => self
                .get_client()?
                .parent_path(collections::CONTACT_IDENTITIES, doc_id.as_str())
                .map_err(|e| AppError::Database(e.to_string()))?,
            DeviceHome::LegacyContact { owner_uid, link_id } => {
                self.link_path(owner_uid, link_id)?
            }
        };

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::DEVICES)
            .parent(&parent)
            .document_id(device_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(device_id, home = ?home, "Deleted dead device");
        Ok(())
    }

    async fn remove_raw_token(&self, owner_uid: &str, link_id: &str, token: &str) -> Result<()> {
        let parent = self.user_path(owner_uid)?;

        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::EMERGENCY_CONTACTS)
            .document_id(link_id)
            .parent(&parent)
            .transforms(|t| {
                t.fields([t
                    .field("tokens")
                    .remove_all_from_array([Into::<firestore::FirestoreValue>::into(
                        token.to_string(),
                    )])])
            })
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(e.to_string()))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(link_id, "Removed dead raw token from contact link");
        Ok(())
    }

    async fn mark_user_notified(&self, uid: &str, at: DateTime<Utc>) -> Result<()> {
        let patch = MissedNotifiedPatch {
            missed_notified_at: at,
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["missed_notified_at"])
            .in_col(collections::USERS)
            .document_id(uid)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn record_contact_send(
        &self,
        owner_uid: &str,
        link_id: &str,
        bookkeeping: &ContactBookkeeping,
    ) -> Result<()> {
        let parent = self.user_path(owner_uid)?;

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields([
                "last_notified_at",
                "last_window_start_min",
                "sent_count_in_window",
            ])
            .in_col(collections::EMERGENCY_CONTACTS)
            .document_id(link_id)
            .parent(&parent)
            .object(bookkeeping)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
