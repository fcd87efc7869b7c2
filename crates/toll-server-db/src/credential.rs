// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Credential repository for database operations.
//!
//! This module provides database access for credential metadata rows.
//! Only non-secret fields live here; HMAC key material is kept in the
//! secret store under a derived name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use std::str::FromStr;
use toll_credentials_core::{
	Credential, CredentialId, CredentialScope, CredentialStatus, MerchantId,
};

use crate::error::DbError;

/// Storage contract the credential engine is written against.
///
/// Every method is an atomic single-row operation; the engine does not
/// assume transactions spanning multiple calls.
#[async_trait]
pub trait CredentialStore: Send + Sync {
	/// Look up a credential by its opaque key string.
	async fn get_by_key(&self, id: &str) -> Result<Option<Credential>, DbError>;
	/// All credentials for a merchant, any status.
	async fn get_by_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<Credential>, DbError>;
	/// The current administrative credential, if one is active.
	async fn get_admin_credential(&self) -> Result<Option<Credential>, DbError>;
	/// Persist a new credential row.
	async fn create(&self, credential: &Credential) -> Result<(), DbError>;
	/// Rewrite an existing row. `NotFound` if the id is unknown.
	async fn update(&self, credential: &Credential) -> Result<(), DbError>;
	/// Active credentials whose `expires_at` is before `now`.
	async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Credential>, DbError>;
	/// Record a successful validation against the credential.
	async fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), DbError>;
}

/// Repository for credential database operations.
///
/// Timestamps are stored as RFC 3339 TEXT columns; the allowed-endpoint
/// list is a JSON array column.
#[derive(Clone)]
pub struct CredentialRepository {
	pool: SqlitePool,
}

const SELECT_COLUMNS: &str = "id, merchant_id, is_admin, name, description, purpose, status, \
	rate_limit, allowed_endpoints, created_at, updated_at, expires_at, \
	last_rotated_at, last_used_at, revoked_at, onboarding_reference, onboarding_timestamp";

impl CredentialRepository {
	/// Create a new credential repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn get_by_key(&self, id: &str) -> Result<Option<Credential>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {SELECT_COLUMNS} FROM credentials WHERE id = ?"
		))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		match row {
			Some(row) => Ok(Some(parse_credential_row(&row)?)),
			None => Ok(None),
		}
	}

	#[tracing::instrument(skip(self), fields(merchant_id = %merchant_id))]
	pub async fn get_by_merchant(
		&self,
		merchant_id: &MerchantId,
	) -> Result<Vec<Credential>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {SELECT_COLUMNS} FROM credentials WHERE merchant_id = ? ORDER BY created_at"
		))
		.bind(merchant_id.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_credential_row).collect()
	}

	/// The newest active administrative credential.
	///
	/// # Note
	/// Rotated/revoked admin credentials are retained but never returned
	/// here; callers wanting history should query by key.
	#[tracing::instrument(skip(self))]
	pub async fn get_admin_credential(&self) -> Result<Option<Credential>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {SELECT_COLUMNS} FROM credentials \
			 WHERE is_admin = 1 AND status = 'ACTIVE' \
			 ORDER BY created_at DESC LIMIT 1"
		))
		.fetch_optional(&self.pool)
		.await?;

		match row {
			Some(row) => Ok(Some(parse_credential_row(&row)?)),
			None => Ok(None),
		}
	}

	#[tracing::instrument(skip(self, credential), fields(credential_id = %credential.id))]
	pub async fn create(&self, credential: &Credential) -> Result<(), DbError> {
		let endpoints_json = serde_json::to_string(&credential.allowed_endpoints)?;

		sqlx::query(
			r#"
			INSERT INTO credentials (
				id, merchant_id, is_admin, name, description, purpose, status,
				rate_limit, allowed_endpoints, created_at, updated_at, expires_at,
				last_rotated_at, last_used_at, revoked_at,
				onboarding_reference, onboarding_timestamp
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(credential.id.as_str())
		.bind(credential.merchant_id().map(MerchantId::as_str))
		.bind(credential.is_admin() as i32)
		.bind(&credential.name)
		.bind(&credential.description)
		.bind(&credential.purpose)
		.bind(credential.status.as_str())
		.bind(credential.rate_limit)
		.bind(&endpoints_json)
		.bind(credential.created_at.to_rfc3339())
		.bind(credential.updated_at.to_rfc3339())
		.bind(credential.expires_at.to_rfc3339())
		.bind(credential.last_rotated_at.map(|t| t.to_rfc3339()))
		.bind(credential.last_used_at.map(|t| t.to_rfc3339()))
		.bind(credential.revoked_at.map(|t| t.to_rfc3339()))
		.bind(&credential.onboarding_reference)
		.bind(credential.onboarding_timestamp.map(|t| t.to_rfc3339()))
		.execute(&self.pool)
		.await?;

		tracing::debug!(credential_id = %credential.id, "credential row created");
		Ok(())
	}

	#[tracing::instrument(skip(self, credential), fields(credential_id = %credential.id))]
	pub async fn update(&self, credential: &Credential) -> Result<(), DbError> {
		let endpoints_json = serde_json::to_string(&credential.allowed_endpoints)?;

		let result = sqlx::query(
			r#"
			UPDATE credentials SET
				name = ?, description = ?, purpose = ?, status = ?,
				rate_limit = ?, allowed_endpoints = ?, updated_at = ?, expires_at = ?,
				last_rotated_at = ?, last_used_at = ?, revoked_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&credential.name)
		.bind(&credential.description)
		.bind(&credential.purpose)
		.bind(credential.status.as_str())
		.bind(credential.rate_limit)
		.bind(&endpoints_json)
		.bind(credential.updated_at.to_rfc3339())
		.bind(credential.expires_at.to_rfc3339())
		.bind(credential.last_rotated_at.map(|t| t.to_rfc3339()))
		.bind(credential.last_used_at.map(|t| t.to_rfc3339()))
		.bind(credential.revoked_at.map(|t| t.to_rfc3339()))
		.bind(credential.id.as_str())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!(
				"credential {} does not exist",
				credential.id
			)));
		}

		tracing::debug!(credential_id = %credential.id, status = %credential.status, "credential row updated");
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Credential>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {SELECT_COLUMNS} FROM credentials \
			 WHERE status = 'ACTIVE' AND expires_at < ? ORDER BY expires_at"
		))
		.bind(now.to_rfc3339())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_credential_row).collect()
	}

	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), DbError> {
		sqlx::query("UPDATE credentials SET last_used_at = ? WHERE id = ?")
			.bind(now.to_rfc3339())
			.bind(id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

#[async_trait]
impl CredentialStore for CredentialRepository {
	async fn get_by_key(&self, id: &str) -> Result<Option<Credential>, DbError> {
		self.get_by_key(id).await
	}

	async fn get_by_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<Credential>, DbError> {
		self.get_by_merchant(merchant_id).await
	}

	async fn get_admin_credential(&self) -> Result<Option<Credential>, DbError> {
		self.get_admin_credential().await
	}

	async fn create(&self, credential: &Credential) -> Result<(), DbError> {
		self.create(credential).await
	}

	async fn update(&self, credential: &Credential) -> Result<(), DbError> {
		self.update(credential).await
	}

	async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Credential>, DbError> {
		self.list_expired(now).await
	}

	async fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), DbError> {
		self.touch_last_used(id, now).await
	}
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))
}

fn parse_optional_timestamp(
	value: Option<String>,
	column: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
	value.map(|s| parse_timestamp(&s, column)).transpose()
}

fn parse_credential_row(row: &sqlx::sqlite::SqliteRow) -> Result<Credential, DbError> {
	let id: String = row.get("id");
	let merchant_id: Option<String> = row.get("merchant_id");
	let is_admin: i32 = row.get("is_admin");
	let name: String = row.get("name");
	let description: Option<String> = row.get("description");
	let purpose: Option<String> = row.get("purpose");
	let status_str: String = row.get("status");
	let rate_limit: i64 = row.get("rate_limit");
	let endpoints_json: String = row.get("allowed_endpoints");
	let created_at_str: String = row.get("created_at");
	let updated_at_str: String = row.get("updated_at");
	let expires_at_str: String = row.get("expires_at");
	let last_rotated_at_str: Option<String> = row.get("last_rotated_at");
	let last_used_at_str: Option<String> = row.get("last_used_at");
	let revoked_at_str: Option<String> = row.get("revoked_at");
	let onboarding_reference: Option<String> = row.get("onboarding_reference");
	let onboarding_timestamp_str: Option<String> = row.get("onboarding_timestamp");

	let scope = if is_admin != 0 {
		CredentialScope::Admin
	} else {
		match merchant_id {
			Some(m) => CredentialScope::merchant(m),
			None => {
				return Err(DbError::Internal(format!(
					"credential {id} has neither merchant_id nor is_admin"
				)))
			}
		}
	};

	let status = CredentialStatus::from_str(&status_str)
		.map_err(|e| DbError::Internal(format!("Invalid status: {e}")))?;

	let allowed_endpoints: Vec<String> = serde_json::from_str(&endpoints_json)?;

	Ok(Credential {
		id: CredentialId::new(id),
		scope,
		name,
		description,
		purpose,
		status,
		rate_limit,
		allowed_endpoints,
		created_at: parse_timestamp(&created_at_str, "created_at")?,
		updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
		expires_at: parse_timestamp(&expires_at_str, "expires_at")?,
		last_rotated_at: parse_optional_timestamp(last_rotated_at_str, "last_rotated_at")?,
		last_used_at: parse_optional_timestamp(last_used_at_str, "last_used_at")?,
		revoked_at: parse_optional_timestamp(revoked_at_str, "revoked_at")?,
		onboarding_reference,
		onboarding_timestamp: parse_optional_timestamp(
			onboarding_timestamp_str,
			"onboarding_timestamp",
		)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_credentials_table, create_test_pool};
	use chrono::Duration;

	async fn make_repo() -> CredentialRepository {
		let pool = create_test_pool().await;
		create_credentials_table(&pool).await;
		CredentialRepository::new(pool)
	}

	fn merchant_credential(merchant: &str, name: &str) -> Credential {
		let now = Utc::now();
		Credential {
			id: CredentialId::generate(),
			scope: CredentialScope::merchant(merchant),
			name: name.to_string(),
			description: Some("integration".to_string()),
			purpose: Some("surcharge quotes".to_string()),
			status: CredentialStatus::Active,
			rate_limit: 1000,
			allowed_endpoints: vec!["/v1/surcharge/*".to_string()],
			created_at: now,
			updated_at: now,
			expires_at: now + Duration::days(365),
			last_rotated_at: None,
			last_used_at: None,
			revoked_at: None,
			onboarding_reference: Some("onb-42".to_string()),
			onboarding_timestamp: Some(now),
		}
	}

	fn admin_credential(name: &str) -> Credential {
		let mut cred = merchant_credential("unused", name);
		cred.scope = CredentialScope::Admin;
		cred
	}

	#[tokio::test]
	async fn create_and_get_round_trips_all_fields() {
		let repo = make_repo().await;
		let cred = merchant_credential("m-1", "Production key");
		repo.create(&cred).await.unwrap();

		let fetched = repo.get_by_key(cred.id.as_str()).await.unwrap().unwrap();
		assert_eq!(fetched.id, cred.id);
		assert_eq!(fetched.name, "Production key");
		assert_eq!(fetched.merchant_id().unwrap().as_str(), "m-1");
		assert_eq!(fetched.status, CredentialStatus::Active);
		assert_eq!(fetched.allowed_endpoints, cred.allowed_endpoints);
		assert_eq!(fetched.onboarding_reference, cred.onboarding_reference);
		assert!(!fetched.is_admin());
	}

	#[tokio::test]
	async fn get_by_key_returns_none_for_unknown_id() {
		let repo = make_repo().await;
		assert!(repo.get_by_key("nope").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn get_by_merchant_excludes_other_merchants() {
		let repo = make_repo().await;
		repo.create(&merchant_credential("m-1", "a")).await.unwrap();
		repo.create(&merchant_credential("m-1", "b")).await.unwrap();
		repo.create(&merchant_credential("m-2", "c")).await.unwrap();

		let listed = repo
			.get_by_merchant(&MerchantId::new("m-1"))
			.await
			.unwrap();
		assert_eq!(listed.len(), 2);
	}

	#[tokio::test]
	async fn admin_lookup_skips_merchant_and_inactive_rows() {
		let repo = make_repo().await;
		repo.create(&merchant_credential("m-1", "merchant key"))
			.await
			.unwrap();

		let mut revoked_admin = admin_credential("old admin");
		revoked_admin.status = CredentialStatus::Revoked;
		repo.create(&revoked_admin).await.unwrap();

		assert!(repo.get_admin_credential().await.unwrap().is_none());

		let admin = admin_credential("service key");
		repo.create(&admin).await.unwrap();

		let fetched = repo.get_admin_credential().await.unwrap().unwrap();
		assert_eq!(fetched.id, admin.id);
		assert!(fetched.is_admin());
	}

	#[tokio::test]
	async fn update_rewrites_status_and_reports_missing_rows() {
		let repo = make_repo().await;
		let mut cred = merchant_credential("m-1", "key");
		repo.create(&cred).await.unwrap();

		cred.transition_to(CredentialStatus::Revoked, Utc::now())
			.unwrap();
		repo.update(&cred).await.unwrap();

		let fetched = repo.get_by_key(cred.id.as_str()).await.unwrap().unwrap();
		assert_eq!(fetched.status, CredentialStatus::Revoked);
		assert!(fetched.revoked_at.is_some());

		let ghost = merchant_credential("m-1", "ghost");
		assert!(matches!(
			repo.update(&ghost).await,
			Err(DbError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn list_expired_only_returns_overdue_active_rows() {
		let repo = make_repo().await;
		let now = Utc::now();

		let mut overdue = merchant_credential("m-1", "overdue");
		overdue.expires_at = now - Duration::hours(1);
		repo.create(&overdue).await.unwrap();

		let mut overdue_revoked = merchant_credential("m-1", "overdue revoked");
		overdue_revoked.expires_at = now - Duration::hours(1);
		overdue_revoked.status = CredentialStatus::Revoked;
		repo.create(&overdue_revoked).await.unwrap();

		let fresh = merchant_credential("m-1", "fresh");
		repo.create(&fresh).await.unwrap();

		let expired = repo.list_expired(now).await.unwrap();
		assert_eq!(expired.len(), 1);
		assert_eq!(expired[0].id, overdue.id);
	}

	#[tokio::test]
	async fn touch_last_used_stamps_the_row() {
		let repo = make_repo().await;
		let cred = merchant_credential("m-1", "key");
		repo.create(&cred).await.unwrap();

		let now = Utc::now();
		repo.touch_last_used(cred.id.as_str(), now).await.unwrap();

		let fetched = repo.get_by_key(cred.id.as_str()).await.unwrap().unwrap();
		assert!(fetched.last_used_at.is_some());
	}
}
