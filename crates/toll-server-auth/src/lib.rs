// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Signed-request authentication for the Toll API.
//!
//! An inbound request carries `(merchant_id-or-empty, credential_id,
//! timestamp, nonce, signature)`. This crate recomputes the expected
//! HMAC-SHA256 signature over the canonical string, guards against replays
//! within a sliding time window, and exposes the single boolean
//! [`RequestValidator::validate`] entry point the HTTP layer calls.
//!
//! # Security Notes
//!
//! - Signature comparison is constant-time; case differences in the base64
//!   rendering are tolerated
//! - Every rejection path returns `false` uniformly so callers cannot
//!   learn which check failed
//! - Infrastructure faults fail closed: a store error rejects the request

pub mod replay;
pub mod signature;
pub mod validator;

pub use replay::ReplayGuard;
pub use signature::{sign, verify, SignatureError};
pub use validator::{RequestValidator, SignedRequest};
