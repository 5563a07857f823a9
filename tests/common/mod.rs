// SPDX-License-Identifier: MIT

//! Shared test fixtures: in-memory store and push gateway fakes.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use wellcheck::db::{CheckinStore, DeviceHome, ScanCursor};
use wellcheck::error::{AppError, Result};
use wellcheck::models::{CheckinUser, ContactBookkeeping, ContactLink, Device};
use wellcheck::services::push::{PushGateway, PushMessage, SendError};
use wellcheck::services::MissedCheckinScanner;

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test store connected to the Firestore emulator.
pub async fn test_store() -> wellcheck::db::FirestoreStore {
    wellcheck::db::FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Raw emulator client for seeding documents the scheduler only reads.
pub async fn emulator_db() -> firestore::FirestoreDb {
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

    firestore::FirestoreDb::with_options_token_source(
        firestore::FirestoreDbOptions::new("test-project".to_string()),
        gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
        gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
    )
    .await
    .expect("Failed to connect to Firestore emulator")
}

/// Create a test app backed by the in-memory fakes.
/// Returns the router plus the fakes for seeding and assertions.
pub fn create_test_app() -> (axum::Router, Arc<MemoryStore>, Arc<MemoryGateway>) {
    let store = MemoryStore::new();
    let push = MemoryGateway::new();

    let state = Arc::new(wellcheck::AppState {
        config: wellcheck::config::Config::test_default(),
        store: store.clone(),
        push: push.clone(),
    });

    (wellcheck::routes::create_router(state), store, push)
}

/// Timestamp at exactly the given minute-epoch.
pub fn at_minute(min: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(min * 60, 0).unwrap()
}

/// Enabled user with a stored due minute.
pub fn overdue_user(uid: &str, due_min: i64) -> CheckinUser {
    CheckinUser {
        uid: uid.to_string(),
        checkin_enabled: true,
        display_name: Some("Alex".to_string()),
        last_checkin_at: None,
        checkin_interval: Some(serde_json::json!(60)),
        due_at_min: Some(serde_json::json!(due_min)),
        missed_notified_at: None,
    }
}

/// Bare contact link (immediate policy, no repeats).
pub fn contact_link(link_id: &str) -> ContactLink {
    ContactLink {
        link_id: link_id.to_string(),
        emergency_contact_uid: None,
        tokens: None,
        notify_policy: None,
        delay_minutes: None,
        repeat_every_minutes: None,
        max_repeats_per_window: None,
        last_notified_at: None,
        last_window_start_min: None,
        sent_count_in_window: None,
    }
}

pub fn device(id: &str, token: &str) -> Device {
    Device {
        device_id: id.to_string(),
        token: token.to_string(),
    }
}

#[derive(Default)]
struct StoreData {
    users: BTreeMap<String, CheckinUser>,
    user_devices: HashMap<String, Vec<Device>>,
    contacts: HashMap<String, Vec<ContactLink>>,
    /// Contact-identity docs: doc id -> canonical uid field.
    identities: HashMap<String, String>,
    identity_devices: HashMap<String, Vec<Device>>,
    legacy_devices: HashMap<(String, String), Vec<Device>>,
    /// UIDs whose contact listing should fail (per-user failure injection).
    fail_contacts_for: HashSet<String>,
    /// When set, every page fetch fails.
    fail_pages: bool,
}

/// In-memory [`CheckinStore`] with the same query semantics as Firestore:
/// only users with a numeric stored due minute match the overdue scan.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, user: CheckinUser) {
        self.data.lock().unwrap().users.insert(user.uid.clone(), user);
    }

    pub fn add_user_device(&self, uid: &str, dev: Device) {
        self.data
            .lock()
            .unwrap()
            .user_devices
            .entry(uid.to_string())
            .or_default()
            .push(dev);
    }

    pub fn add_contact(&self, uid: &str, link: ContactLink) {
        self.data
            .lock()
            .unwrap()
            .contacts
            .entry(uid.to_string())
            .or_default()
            .push(link);
    }

    pub fn add_identity(&self, doc_id: &str, contact_uid: &str) {
        self.data
            .lock()
            .unwrap()
            .identities
            .insert(doc_id.to_string(), contact_uid.to_string());
    }

    pub fn add_identity_device(&self, doc_id: &str, dev: Device) {
        self.data
            .lock()
            .unwrap()
            .identity_devices
            .entry(doc_id.to_string())
            .or_default()
            .push(dev);
    }

    pub fn add_legacy_device(&self, owner_uid: &str, link_id: &str, dev: Device) {
        self.data
            .lock()
            .unwrap()
            .legacy_devices
            .entry((owner_uid.to_string(), link_id.to_string()))
            .or_default()
            .push(dev);
    }

    pub fn fail_contacts_for(&self, uid: &str) {
        self.data
            .lock()
            .unwrap()
            .fail_contacts_for
            .insert(uid.to_string());
    }

    pub fn fail_pages(&self, fail: bool) {
        self.data.lock().unwrap().fail_pages = fail;
    }

    pub fn user(&self, uid: &str) -> CheckinUser {
        self.data.lock().unwrap().users.get(uid).unwrap().clone()
    }

    pub fn contact(&self, uid: &str, link_id: &str) -> ContactLink {
        self.data.lock().unwrap().contacts[uid]
            .iter()
            .find(|l| l.link_id == link_id)
            .unwrap()
            .clone()
    }

    pub fn user_devices_snapshot(&self, uid: &str) -> Vec<Device> {
        self.data
            .lock()
            .unwrap()
            .user_devices
            .get(uid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn identity_devices_snapshot(&self, doc_id: &str) -> Vec<Device> {
        self.data
            .lock()
            .unwrap()
            .identity_devices
            .get(doc_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CheckinStore for MemoryStore {
    async fn overdue_users_page(
        &self,
        now_min: i64,
        page_size: u32,
        cursor: Option<&ScanCursor>,
    ) -> Result<Vec<CheckinUser>> {
        let data = self.data.lock().unwrap();
        if data.fail_pages {
            return Err(AppError::Database("injected page fetch failure".to_string()));
        }

        let mut matches: Vec<(i64, CheckinUser)> = data
            .users
            .values()
            .filter(|u| u.checkin_enabled)
            .filter_map(|u| {
                let due = wellcheck::services::policy::coerce_minutes(u.due_at_min.as_ref())?;
                (due <= now_min).then(|| (due, u.clone()))
            })
            .collect();
        matches.sort_by(|a, b| (a.0, &a.1.uid).cmp(&(b.0, &b.1.uid)));

        let page: Vec<CheckinUser> = matches
            .into_iter()
            .filter(|(due, u)| match cursor {
                Some(c) => (*due, u.uid.as_str()) > (c.due_at_min, c.uid.as_str()),
                None => true,
            })
            .take(page_size as usize)
            .map(|(_, u)| u)
            .collect();

        Ok(page)
    }

    async fn user_devices(&self, uid: &str) -> Result<Vec<Device>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .user_devices
            .get(uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn emergency_contacts(&self, uid: &str) -> Result<Vec<ContactLink>> {
        let data = self.data.lock().unwrap();
        if data.fail_contacts_for.contains(uid) {
            return Err(AppError::Database(format!(
                "injected contact listing failure for {}",
                uid
            )));
        }
        Ok(data.contacts.get(uid).cloned().unwrap_or_default())
    }

    async fn find_contact_identity(&self, contact_uid: &str) -> Result<Option<String>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .identities
            .iter()
            .find(|(_, uid)| uid.as_str() == contact_uid)
            .map(|(doc_id, _)| doc_id.clone()))
    }

    async fn contact_identity_devices(&self, doc_id: &str) -> Result<Vec<Device>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .identity_devices
            .get(doc_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn legacy_contact_devices(&self, owner_uid: &str, link_id: &str) -> Result<Vec<Device>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .legacy_devices
            .get(&(owner_uid.to_string(), link_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_device(&self, home: &DeviceHome, device_id: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let devices = match home {
            DeviceHome::User { uid } => data.user_devices.get_mut(uid),
            DeviceHome::ContactIdentity { doc_id } => data.identity_devices.get_mut(doc_id),
            DeviceHome::LegacyContact { owner_uid, link_id } => data
                .legacy_devices
                .get_mut(&(owner_uid.clone(), link_id.clone())),
        };
        if let Some(devices) = devices {
            devices.retain(|d| d.device_id != device_id);
        }
        Ok(())
    }

    async fn remove_raw_token(&self, owner_uid: &str, link_id: &str, token: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(links) = data.contacts.get_mut(owner_uid) {
            if let Some(link) = links.iter_mut().find(|l| l.link_id == link_id) {
                if let Some(tokens) = link.tokens.as_mut() {
                    tokens.retain(|t| t != token);
                }
            }
        }
        Ok(())
    }

    async fn mark_user_notified(&self, uid: &str, at: DateTime<Utc>) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(user) = data.users.get_mut(uid) {
            user.missed_notified_at = Some(at);
        }
        Ok(())
    }

    async fn record_contact_send(
        &self,
        owner_uid: &str,
        link_id: &str,
        bookkeeping: &ContactBookkeeping,
    ) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(links) = data.contacts.get_mut(owner_uid) {
            if let Some(link) = links.iter_mut().find(|l| l.link_id == link_id) {
                link.last_notified_at = Some(bookkeeping.last_notified_at);
                link.last_window_start_min = Some(bookkeeping.last_window_start_min);
                link.sent_count_in_window = Some(bookkeeping.sent_count_in_window);
            }
        }
        Ok(())
    }
}

/// One recorded push send.
#[derive(Debug, Clone)]
pub struct SentPush {
    pub token: String,
    pub title: String,
    pub body: String,
}

/// In-memory [`PushGateway`] recording every accepted send.
#[derive(Default)]
pub struct MemoryGateway {
    sends: Mutex<Vec<SentPush>>,
    dead_tokens: Mutex<HashSet<String>>,
    failing_tokens: Mutex<HashSet<String>>,
}

impl MemoryGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a token as permanently invalid (reported dead on send).
    pub fn mark_dead(&self, token: &str) {
        self.dead_tokens.lock().unwrap().insert(token.to_string());
    }

    /// Mark a token as transiently failing.
    pub fn mark_failing(&self, token: &str) {
        self.failing_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn clear_failing(&self, token: &str) {
        self.failing_tokens.lock().unwrap().remove(token);
    }

    pub fn sends(&self) -> Vec<SentPush> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sends_to(&self, token: &str) -> usize {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.token == token)
            .count()
    }
}

#[async_trait]
impl PushGateway for MemoryGateway {
    async fn send(&self, token: &str, message: &PushMessage) -> std::result::Result<(), SendError> {
        if self.dead_tokens.lock().unwrap().contains(token) {
            return Err(SendError::dead_token("registration token not registered"));
        }
        if self.failing_tokens.lock().unwrap().contains(token) {
            return Err(SendError::transient("service unavailable"));
        }

        self.sends.lock().unwrap().push(SentPush {
            token: token.to_string(),
            title: message.title.clone(),
            body: message.body.clone(),
        });
        Ok(())
    }
}

/// Scanner wired to the in-memory fakes.
pub fn scanner(store: &Arc<MemoryStore>, push: &Arc<MemoryGateway>) -> MissedCheckinScanner {
    MissedCheckinScanner::new(store.clone(), push.clone())
}
