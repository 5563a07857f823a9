// SPDX-License-Identifier: MIT

//! HTTP middleware.

pub mod scheduler_auth;
