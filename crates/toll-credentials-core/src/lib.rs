// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Toll API credential system.
//!
//! This crate defines the domain model shared by the credential lifecycle
//! manager, the signed-request validator, and the persistence layer:
//!
//! - **ID newtypes**: [`CredentialId`] and [`MerchantId`] preventing
//!   accidental mixing of opaque identifier strings
//! - **Status state machine**: [`CredentialStatus`] with explicit terminal
//!   states and transition checks
//! - **Scope**: [`CredentialScope`] distinguishing administrative
//!   (cross-merchant) credentials from merchant-scoped ones
//! - **Secret material**: [`SecretValue`] (zeroized, never logged) and the
//!   [`SecretRecord`] stored in the secret store
//!
//! No I/O happens here; everything is plain data plus invariant checks.

pub mod credential;
pub mod error;
pub mod secret;
pub mod types;

pub use credential::{Credential, CredentialUpdate};
pub use error::CoreError;
pub use secret::{SecretRecord, SecretValue};
pub use types::{CredentialId, CredentialScope, CredentialStatus, MerchantId};
