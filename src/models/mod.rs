// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod contact;
pub mod user;

pub use contact::{ContactBookkeeping, ContactLink};
pub use user::{CheckinUser, Device};
