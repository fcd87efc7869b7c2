// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Secret store contract and implementations.
//!
//! Secrets are JSON-encoded [`SecretRecord`] documents addressed by a
//! deterministic name derived from the owning identity; the store itself
//! is an opaque key-value surface. Plaintext secret values never appear
//! in logs or query traces.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::sync::atomic::{AtomicBool, Ordering};
use toll_credentials_core::{CredentialId, MerchantId, SecretRecord};

use crate::error::DbError;

/// Derives the storage name for a secret from its owning identity.
///
/// Pure string formatting; trusted to be collision-free across
/// legitimately distinct identities. Prefixes are configurable so
/// environments can namespace their stores.
#[derive(Debug, Clone)]
pub struct SecretNamer {
	merchant_prefix: String,
	service_prefix: String,
}

impl SecretNamer {
	pub fn new(merchant_prefix: impl Into<String>, service_prefix: impl Into<String>) -> Self {
		Self {
			merchant_prefix: merchant_prefix.into(),
			service_prefix: service_prefix.into(),
		}
	}

	/// Name for a merchant-scoped credential secret.
	#[must_use]
	pub fn merchant_secret(&self, merchant_id: &MerchantId, credential_id: &CredentialId) -> String {
		format!("{}-{}-{}", self.merchant_prefix, merchant_id, credential_id)
	}

	/// Name for an administrative (service) secret.
	#[must_use]
	pub fn service_secret(&self, service_name: &str) -> String {
		format!("{}-{}", self.service_prefix, service_name)
	}
}

impl Default for SecretNamer {
	fn default() -> Self {
		Self::new("cred", "svc")
	}
}

/// Opaque key-value contract for secret persistence.
#[async_trait]
pub trait SecretStore: Send + Sync {
	/// Fetch a record by derived name.
	async fn get(&self, name: &str) -> Result<Option<SecretRecord>, DbError>;
	/// Store a new record. `Conflict` if the name is already taken.
	async fn put(&self, name: &str, record: &SecretRecord) -> Result<(), DbError>;
	/// Rewrite an existing record. `NotFound` if the name is unknown.
	async fn update(&self, name: &str, record: &SecretRecord) -> Result<(), DbError>;
}

/// SQLite-backed secret store: one JSON TEXT column keyed by name.
#[derive(Clone)]
pub struct SqliteSecretStore {
	pool: SqlitePool,
}

impl SqliteSecretStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl SecretStore for SqliteSecretStore {
	#[tracing::instrument(skip(self), fields(secret_name = %name))]
	async fn get(&self, name: &str) -> Result<Option<SecretRecord>, DbError> {
		let row = sqlx::query("SELECT record FROM secrets WHERE name = ?")
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;

		match row {
			Some(row) => {
				let json: String = row.get("record");
				Ok(Some(serde_json::from_str(&json)?))
			}
			None => Ok(None),
		}
	}

	#[tracing::instrument(skip(self, record), fields(secret_name = %name))]
	async fn put(&self, name: &str, record: &SecretRecord) -> Result<(), DbError> {
		let json = serde_json::to_string(record)?;
		let result = sqlx::query(
			"INSERT INTO secrets (name, record, updated_at) VALUES (?, ?, ?) \
			 ON CONFLICT(name) DO NOTHING",
		)
		.bind(name)
		.bind(&json)
		.bind(Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::Conflict(format!("secret {name} already exists")));
		}

		tracing::debug!(secret_name = %name, "secret record stored");
		Ok(())
	}

	#[tracing::instrument(skip(self, record), fields(secret_name = %name))]
	async fn update(&self, name: &str, record: &SecretRecord) -> Result<(), DbError> {
		let json = serde_json::to_string(record)?;
		let result = sqlx::query("UPDATE secrets SET record = ?, updated_at = ? WHERE name = ?")
			.bind(&json)
			.bind(Utc::now().to_rfc3339())
			.bind(name)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("secret {name} does not exist")));
		}

		tracing::debug!(secret_name = %name, "secret record updated");
		Ok(())
	}
}

/// In-memory secret store for tests.
///
/// Supports one-shot failure injection so lifecycle tests can assert the
/// both-or-neither semantics of revoke and rotate when the secret write
/// fails after the metadata write.
#[derive(Default)]
pub struct InMemorySecretStore {
	records: DashMap<String, SecretRecord>,
	fail_next_put: AtomicBool,
	fail_next_update: AtomicBool,
}

impl InMemorySecretStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Make the next `put` fail with an internal error.
	pub fn fail_next_put(&self) {
		self.fail_next_put.store(true, Ordering::SeqCst);
	}

	/// Make the next `update` fail with an internal error.
	pub fn fail_next_update(&self) {
		self.fail_next_update.store(true, Ordering::SeqCst);
	}

	/// Number of stored records.
	#[must_use]
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// True when no records are stored.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
	async fn get(&self, name: &str) -> Result<Option<SecretRecord>, DbError> {
		Ok(self.records.get(name).map(|r| r.value().clone()))
	}

	async fn put(&self, name: &str, record: &SecretRecord) -> Result<(), DbError> {
		if self.fail_next_put.swap(false, Ordering::SeqCst) {
			return Err(DbError::Internal("injected put failure".to_string()));
		}
		match self.records.entry(name.to_string()) {
			dashmap::mapref::entry::Entry::Occupied(_) => {
				Err(DbError::Conflict(format!("secret {name} already exists")))
			}
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				slot.insert(record.clone());
				Ok(())
			}
		}
	}

	async fn update(&self, name: &str, record: &SecretRecord) -> Result<(), DbError> {
		if self.fail_next_update.swap(false, Ordering::SeqCst) {
			return Err(DbError::Internal("injected update failure".to_string()));
		}
		match self.records.get_mut(name) {
			Some(mut slot) => {
				*slot = record.clone();
				Ok(())
			}
			None => Err(DbError::NotFound(format!("secret {name} does not exist"))),
		}
	}
}
