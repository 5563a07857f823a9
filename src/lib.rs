// SPDX-License-Identifier: MIT

//! Wellcheck: safety check-in backend.
//!
//! This crate provides the missed-check-in detection and escalation
//! scheduler: a periodic scan over overdue users that notifies the user on
//! their own devices, then alerts each of their emergency contacts under a
//! per-contact delay/repeat/cap policy.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::CheckinStore;
use services::PushGateway;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CheckinStore>,
    pub push: Arc<dyn PushGateway>,
}
