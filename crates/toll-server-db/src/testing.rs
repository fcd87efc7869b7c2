// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared schema helpers for in-memory test databases, plus a
//! fault-injecting credential store wrapper for partial-failure tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use toll_credentials_core::{Credential, MerchantId};

use crate::credential::{CredentialRepository, CredentialStore};
use crate::error::DbError;

pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str(":memory:")
		.unwrap()
		.create_if_missing(true);

	SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("Failed to create test pool")
}

pub async fn create_credentials_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS credentials (
			id TEXT PRIMARY KEY,
			merchant_id TEXT,
			is_admin INTEGER NOT NULL DEFAULT 0,
			name TEXT NOT NULL,
			description TEXT,
			purpose TEXT,
			status TEXT NOT NULL,
			rate_limit INTEGER NOT NULL,
			allowed_endpoints TEXT NOT NULL,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL,
			expires_at TEXT NOT NULL,
			last_rotated_at TEXT,
			last_used_at TEXT,
			revoked_at TEXT,
			onboarding_reference TEXT,
			onboarding_timestamp TEXT
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_secrets_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS secrets (
			name TEXT PRIMARY KEY,
			record TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_merchants_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS merchants (
			id TEXT PRIMARY KEY,
			display_name TEXT NOT NULL,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn insert_merchant(pool: &SqlitePool, id: &str, display_name: &str) {
	sqlx::query("INSERT INTO merchants (id, display_name, created_at) VALUES (?, ?, ?)")
		.bind(id)
		.bind(display_name)
		.bind(Utc::now().to_rfc3339())
		.execute(pool)
		.await
		.unwrap();
}

/// Credential store wrapper with one-shot write failures, the
/// metadata-side counterpart of the in-memory secret store's fail-next
/// switches. Reads always pass through.
pub struct UnreliableCredentialStore {
	inner: CredentialRepository,
	fail_next_create: AtomicBool,
	fail_next_update: AtomicBool,
}

impl UnreliableCredentialStore {
	#[must_use]
	pub fn new(inner: CredentialRepository) -> Self {
		Self {
			inner,
			fail_next_create: AtomicBool::new(false),
			fail_next_update: AtomicBool::new(false),
		}
	}

	/// Make the next `create` fail with an internal error.
	pub fn fail_next_create(&self) {
		self.fail_next_create.store(true, Ordering::SeqCst);
	}

	/// Make the next `update` fail with an internal error.
	pub fn fail_next_update(&self) {
		self.fail_next_update.store(true, Ordering::SeqCst);
	}
}

#[async_trait]
impl CredentialStore for UnreliableCredentialStore {
	async fn get_by_key(&self, id: &str) -> Result<Option<Credential>, DbError> {
		self.inner.get_by_key(id).await
	}

	async fn get_by_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<Credential>, DbError> {
		self.inner.get_by_merchant(merchant_id).await
	}

	async fn get_admin_credential(&self) -> Result<Option<Credential>, DbError> {
		self.inner.get_admin_credential().await
	}

	async fn create(&self, credential: &Credential) -> Result<(), DbError> {
		if self.fail_next_create.swap(false, Ordering::SeqCst) {
			return Err(DbError::Internal("injected create failure".to_string()));
		}
		self.inner.create(credential).await
	}

	async fn update(&self, credential: &Credential) -> Result<(), DbError> {
		if self.fail_next_update.swap(false, Ordering::SeqCst) {
			return Err(DbError::Internal("injected update failure".to_string()));
		}
		self.inner.update(credential).await
	}

	async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Credential>, DbError> {
		self.inner.list_expired(now).await
	}

	async fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), DbError> {
		self.inner.touch_last_used(id, now).await
	}
}
