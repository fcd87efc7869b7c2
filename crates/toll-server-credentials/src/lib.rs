// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential lifecycle management for the Toll API.
//!
//! This crate owns the issuance, rotation, revocation and update of API
//! credentials ([`CredentialManager`]) and the hourly background sweep
//! that expires stale ones ([`ExpirationSweeper`]). It writes through the
//! storage contracts in `toll-server-db`; the signed-request validation
//! side lives in `toll-server-auth`.

pub mod config;
pub mod error;
pub mod manager;
pub mod sweeper;

pub use config::EngineConfig;
pub use error::{CredentialError, Result};
pub use manager::{CredentialManager, IssueRequest, IssuedCredential};
pub use sweeper::ExpirationSweeper;
