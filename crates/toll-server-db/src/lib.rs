// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the Toll credential system.
//!
//! This crate provides the two storage contracts the credential engine is
//! written against, plus their SQLite implementations:
//!
//! - [`CredentialStore`] / [`CredentialRepository`]: non-secret credential
//!   metadata rows
//! - [`SecretStore`] / [`SqliteSecretStore`]: JSON-encoded secret records
//!   addressed by a deterministic derived name
//! - [`MerchantDirectory`]: the minimal merchant-existence check issuance
//!   needs
//!
//! The engine assumes each individual write is durable when its call
//! returns; it does not assume multi-row transactions across the two
//! stores.

pub mod credential;
pub mod error;
pub mod merchant;
pub mod pool;
pub mod secret_store;
pub mod testing;

pub use credential::{CredentialRepository, CredentialStore};
pub use error::{DbError, Result};
pub use merchant::{MerchantDirectory, MerchantRepository};
pub use pool::create_pool;
pub use secret_store::{InMemorySecretStore, SecretNamer, SecretStore, SqliteSecretStore};
