// SPDX-License-Identifier: MIT

//! Database layer (Firestore) and the store port consumed by the scheduler.

pub mod firestore;

pub use firestore::FirestoreStore;

use crate::error::Result;
use crate::models::{CheckinUser, ContactBookkeeping, ContactLink, Device};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Device subcollection (under users, contact identities, and legacy links)
    pub const DEVICES: &str = "devices";
    /// Contact link subcollection under a user
    pub const EMERGENCY_CONTACTS: &str = "emergency_contacts";
    /// Top-level contact identities, filtered by their `uid` field
    pub const CONTACT_IDENTITIES: &str = "contacts";
}

/// Keyset cursor for the overdue-user scan.
///
/// The scan orders by `(due_at_min, uid)`, so the cursor carries both values
/// of the last iterated document.
#[derive(Debug, Clone)]
pub struct ScanCursor {
    pub due_at_min: i64,
    pub uid: String,
}

/// Where a device document lives, for dead-token cleanup.
#[derive(Debug, Clone)]
pub enum DeviceHome {
    /// `users/{uid}/devices`
    User { uid: String },
    /// `contacts/{doc_id}/devices`
    ContactIdentity { doc_id: String },
    /// `users/{owner_uid}/emergency_contacts/{link_id}/devices` (deprecated)
    LegacyContact { owner_uid: String, link_id: String },
}

/// Store operations consumed by the scan and escalation engine.
///
/// Implemented by [`FirestoreStore`] in production and by in-memory fakes in
/// the integration tests.
#[async_trait]
pub trait CheckinStore: Send + Sync {
    /// One page of users with `checkin_enabled == true` and a stored due
    /// minute `<= now_min`, ordered ascending by `(due_at_min, uid)`,
    /// starting after `cursor` when present.
    async fn overdue_users_page(
        &self,
        now_min: i64,
        page_size: u32,
        cursor: Option<&ScanCursor>,
    ) -> Result<Vec<CheckinUser>>;

    /// Devices registered by the user themselves.
    async fn user_devices(&self, uid: &str) -> Result<Vec<Device>>;

    /// Emergency contact links configured under a user.
    async fn emergency_contacts(&self, uid: &str) -> Result<Vec<ContactLink>>;

    /// Resolve a registered contact identity document by its canonical uid.
    async fn find_contact_identity(&self, contact_uid: &str) -> Result<Option<String>>;

    /// Devices registered under a resolved contact identity document.
    async fn contact_identity_devices(&self, doc_id: &str) -> Result<Vec<Device>>;

    /// Devices stored under the legacy per-link location.
    async fn legacy_contact_devices(&self, owner_uid: &str, link_id: &str) -> Result<Vec<Device>>;

    /// Delete a device document whose token the transport reported dead.
    async fn delete_device(&self, home: &DeviceHome, device_id: &str) -> Result<()>;

    /// Remove a dead raw token from a contact link's `tokens` array.
    async fn remove_raw_token(&self, owner_uid: &str, link_id: &str, token: &str) -> Result<()>;

    /// Merge-write `missed_notified_at` onto the user record.
    async fn mark_user_notified(&self, uid: &str, at: DateTime<Utc>) -> Result<()>;

    /// Merge-write contact bookkeeping after a confirmed delivery.
    async fn record_contact_send(
        &self,
        owner_uid: &str,
        link_id: &str,
        bookkeeping: &ContactBookkeeping,
    ) -> Result<()>;
}
