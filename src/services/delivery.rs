// SPDX-License-Identifier: MIT

//! Send loops with dead-token cleanup.
//!
//! One dead or failing token must never abort sends to the remaining tokens,
//! so every per-token error is logged and swallowed here. The caller only
//! learns how many sends were actually accepted.

use crate::db::{CheckinStore, DeviceHome};
use crate::models::Device;
use crate::services::push::{PushGateway, PushMessage};

/// Send to every device, deleting devices whose token is reported dead.
///
/// Returns the number of accepted sends.
pub async fn send_to_devices(
    push: &dyn PushGateway,
    store: &dyn CheckinStore,
    home: &DeviceHome,
    devices: &[Device],
    message: &PushMessage,
) -> u32 {
    let mut delivered = 0;

    for device in devices {
        match push.send(&device.token, message).await {
            Ok(()) => delivered += 1,
            Err(e) if e.is_dead_token() => {
                tracing::info!(
                    device_id = %device.device_id,
                    error = %e,
                    "Dead token reported, deleting device"
                );
                if let Err(del_err) = store.delete_device(home, &device.device_id).await {
                    tracing::warn!(
                        device_id = %device.device_id,
                        error = %del_err,
                        "Failed to delete dead device"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(device_id = %device.device_id, error = %e, "Push send failed");
            }
        }
    }

    delivered
}

/// Send to raw fallback tokens stored directly on a contact link, removing
/// tokens reported dead from the link's `tokens` array.
///
/// Returns the number of accepted sends.
pub async fn send_to_raw_tokens(
    push: &dyn PushGateway,
    store: &dyn CheckinStore,
    owner_uid: &str,
    link_id: &str,
    tokens: &[String],
    message: &PushMessage,
) -> u32 {
    let mut delivered = 0;

    for token in tokens {
        match push.send(token, message).await {
            Ok(()) => delivered += 1,
            Err(e) if e.is_dead_token() => {
                tracing::info!(
                    link_id = %link_id,
                    error = %e,
                    "Dead raw token reported, removing from contact link"
                );
                if let Err(rm_err) = store.remove_raw_token(owner_uid, link_id, token).await {
                    tracing::warn!(
                        link_id = %link_id,
                        error = %rm_err,
                        "Failed to remove dead raw token"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(link_id = %link_id, error = %e, "Push send failed");
            }
        }
    }

    delivered
}
