// SPDX-License-Identifier: MIT

//! Business logic services.

pub mod delivery;
pub mod escalation;
pub mod policy;
pub mod push;
pub mod scan;

pub use push::{FcmClient, PushGateway};
pub use scan::{MissedCheckinScanner, ScanSummary};
