// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Credential issuance, rotation, revocation and update.
//!
//! Write ordering is chosen to fail safe without multi-store
//! transactions: issuance stores the secret before the metadata row
//! becomes visible; rotation flips the old row last so a partial failure
//! never leaves two active siblings; revocation surfaces a secret-store
//! failure after the metadata flip as an error rather than hiding the
//! divergence. Admin rotation swaps the single shared service secret
//! only after the replacement row is durable, and puts the previous
//! record back if the old-row flip fails.
//!
//! Rotate and revoke against the same credential id are serialized
//! through a per-credential lock map; operations on different credentials
//! never contend, and an entry is dropped again once no task holds it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tokio::sync::Mutex;
use toll_credentials_core::{
	Credential, CredentialId, CredentialScope, CredentialStatus, MerchantId, SecretRecord,
	SecretValue,
};
use toll_server_db::{CredentialStore, MerchantDirectory, SecretNamer, SecretStore};

use crate::config::EngineConfig;
use crate::error::{CredentialError, Result};

/// Bytes of entropy behind a generated secret.
const SECRET_BYTES: usize = 64;

/// Caller-supplied fields for issuing a credential.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
	/// Display name; deduplicated per merchant, defaulted when absent.
	pub name: Option<String>,
	pub description: Option<String>,
	pub purpose: Option<String>,
	pub rate_limit: Option<i64>,
	pub allowed_endpoints: Option<Vec<String>>,
	/// Provenance of the merchant onboarding that requested the key.
	/// Required for merchant-scoped issuance.
	pub onboarding_reference: Option<String>,
	pub onboarding_timestamp: Option<DateTime<Utc>>,
}

/// The result of issuance or rotation.
///
/// This is the only time the plaintext secret crosses the API; it is not
/// retrievable afterwards.
#[derive(Debug)]
pub struct IssuedCredential {
	pub credential: Credential,
	pub secret: SecretValue,
}

/// Orchestrates the credential lifecycle against the metadata repository
/// and the secret store.
pub struct CredentialManager {
	credentials: Arc<dyn CredentialStore>,
	secrets: Arc<dyn SecretStore>,
	merchants: Arc<dyn MerchantDirectory>,
	namer: SecretNamer,
	config: EngineConfig,
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialManager {
	pub fn new(
		credentials: Arc<dyn CredentialStore>,
		secrets: Arc<dyn SecretStore>,
		merchants: Arc<dyn MerchantDirectory>,
		config: EngineConfig,
	) -> Self {
		Self {
			credentials,
			secrets,
			merchants,
			namer: config.secret_namer(),
			config,
			locks: DashMap::new(),
		}
	}

	/// Issue a new credential.
	///
	/// Merchant scope requires the merchant to exist, onboarding
	/// provenance to be stated, and fewer than the configured cap of
	/// active credentials. Admin scope skips all three.
	///
	/// The secret is written to the secret store before the metadata row
	/// is created, so a credential is never visible without its secret.
	#[tracing::instrument(skip(self, request))]
	pub async fn issue(
		&self,
		scope: CredentialScope,
		request: IssueRequest,
	) -> Result<IssuedCredential> {
		let now = Utc::now();

		let name = match &scope {
			CredentialScope::Admin => request
				.name
				.clone()
				.unwrap_or_else(|| "Service credential".to_string()),
			CredentialScope::Merchant { merchant_id } => {
				if !self.merchants.exists(merchant_id).await? {
					return Err(CredentialError::NotFound(format!(
						"merchant {merchant_id}"
					)));
				}
				if request.onboarding_reference.is_none() {
					return Err(CredentialError::InvalidArgument(
						"onboarding reference is required for merchant credentials".to_string(),
					));
				}

				let existing = self.credentials.get_by_merchant(merchant_id).await?;
				let active = existing
					.iter()
					.filter(|c| c.status == CredentialStatus::Active)
					.count();
				if active >= self.config.max_active_per_merchant {
					return Err(CredentialError::LimitExceeded {
						merchant_id: merchant_id.to_string(),
						limit: self.config.max_active_per_merchant,
					});
				}

				let base = request
					.name
					.clone()
					.unwrap_or_else(|| "API credential".to_string());
				let taken: Vec<String> = existing.iter().map(|c| c.name.clone()).collect();
				unique_name(&base, &taken)
			}
		};

		let allowed_endpoints = request.allowed_endpoints.clone().unwrap_or_default();
		if !scope.is_admin() {
			self.reject_admin_patterns(&allowed_endpoints)?;
		}

		let credential = Credential {
			id: CredentialId::generate(),
			scope,
			name,
			description: request.description,
			purpose: request.purpose,
			status: CredentialStatus::Active,
			rate_limit: request.rate_limit.unwrap_or(self.config.default_rate_limit),
			allowed_endpoints,
			created_at: now,
			updated_at: now,
			expires_at: now + chrono::Duration::days(self.config.credential_expiry_days),
			last_rotated_at: None,
			last_used_at: None,
			revoked_at: None,
			onboarding_reference: request.onboarding_reference,
			onboarding_timestamp: request.onboarding_timestamp,
		};

		let secret = generate_secret();
		let record = SecretRecord::new_active(
			credential.id.clone(),
			secret.clone(),
			credential.merchant_id().cloned(),
			now,
		);

		self.secrets
			.put(&self.secret_name(&credential), &record)
			.await?;
		self.credentials.create(&credential).await?;

		tracing::info!(credential_id = %credential.id, "credential issued");
		Ok(IssuedCredential { credential, secret })
	}

	/// Rotate a credential: the current row becomes `Rotated` and a new
	/// active sibling is issued carrying forward rate limit, allowed
	/// endpoints and purpose.
	///
	/// `expected_merchant` scopes the lookup; a credential owned by a
	/// different merchant reports `NotFound` rather than leaking its
	/// existence.
	#[tracing::instrument(skip(self), fields(credential_id = %credential_id))]
	pub async fn rotate(
		&self,
		credential_id: &str,
		expected_merchant: Option<&MerchantId>,
	) -> Result<IssuedCredential> {
		let lock = self.lock_for(credential_id);
		let guard = lock.lock().await;
		let result = self.rotate_locked(credential_id, expected_merchant).await;
		drop(guard);
		self.release_lock(credential_id, &lock);
		result
	}

	async fn rotate_locked(
		&self,
		credential_id: &str,
		expected_merchant: Option<&MerchantId>,
	) -> Result<IssuedCredential> {
		let mut current = self.get_owned(credential_id, expected_merchant).await?;
		match current.status {
			CredentialStatus::Active => {}
			other => {
				return Err(CredentialError::InvalidState(format!(
					"cannot rotate a {other} credential"
				)))
			}
		}

		let now = Utc::now();
		let replacement = Credential {
			id: CredentialId::generate(),
			scope: current.scope.clone(),
			name: current.name.clone(),
			description: current.description.clone(),
			purpose: current.purpose.clone(),
			status: CredentialStatus::Active,
			rate_limit: current.rate_limit,
			allowed_endpoints: current.allowed_endpoints.clone(),
			created_at: now,
			updated_at: now,
			expires_at: now + chrono::Duration::days(self.config.credential_expiry_days),
			last_rotated_at: None,
			last_used_at: None,
			revoked_at: None,
			onboarding_reference: current.onboarding_reference.clone(),
			onboarding_timestamp: current.onboarding_timestamp,
		};

		let secret = generate_secret();
		let record = SecretRecord::new_active(
			replacement.id.clone(),
			secret.clone(),
			replacement.merchant_id().cloned(),
			now,
		);

		// Merchant secret names embed the credential id, so the new
		// record goes in under a fresh name before the replacement row
		// exists. The admin service secret has one fixed name; that
		// shared slot is swapped only once the replacement row is
		// durable, so a failed create leaves the current admin
		// credential able to validate with its current key.
		let replacement_name = self.secret_name(&replacement);
		let previous_service_record = if replacement.is_admin() {
			let previous = self.secrets.get(&replacement_name).await?;
			self.credentials.create(&replacement).await?;
			if let Err(e) = self.secrets.update(&replacement_name, &record).await {
				self.compensate_revoke(&replacement, now).await;
				return Err(e.into());
			}
			previous
		} else {
			self.secrets.put(&replacement_name, &record).await?;
			self.credentials.create(&replacement).await?;
			None
		};

		// Flip the old row last. If this fails we compensate by revoking
		// the replacement so the merchant never ends up with two active
		// siblings from one rotation.
		let old_name = current.name.clone();
		current.name = format!("{} (rotated {})", old_name, now.to_rfc3339());
		if let Err(e) = self.flip_rotated(&mut current, now).await {
			tracing::warn!(
				credential_id = %credential_id,
				error = %e,
				"rotation flip failed, revoking replacement"
			);
			// The service slot already holds the replacement key; put
			// the previous record back so the still-active admin
			// credential keeps validating.
			if let Some(previous) = &previous_service_record {
				if let Err(restore) = self.secrets.update(&replacement_name, previous).await {
					tracing::warn!(
						credential_id = %credential_id,
						error = %restore,
						"service secret restore failed; manual cleanup required"
					);
				}
			}
			self.compensate_revoke(&replacement, now).await;
			return Err(e);
		}

		// Mirror the rotation into the old secret record; a failure here
		// is reported so the caller knows the stores diverged. Admin
		// rotation already replaced the single service record above.
		if !current.is_admin() {
			self.mirror_status(&current, CredentialStatus::Rotated, now)
				.await?;
		}

		tracing::info!(
			old_credential_id = %credential_id,
			new_credential_id = %replacement.id,
			"credential rotated"
		);
		Ok(IssuedCredential {
			credential: replacement,
			secret,
		})
	}

	/// Revoke a credential. Revoking an already-revoked credential is a
	/// benign no-op.
	#[tracing::instrument(skip(self), fields(credential_id = %credential_id))]
	pub async fn revoke(
		&self,
		credential_id: &str,
		expected_merchant: Option<&MerchantId>,
	) -> Result<()> {
		let lock = self.lock_for(credential_id);
		let guard = lock.lock().await;
		let result = self.revoke_locked(credential_id, expected_merchant).await;
		drop(guard);
		self.release_lock(credential_id, &lock);
		result
	}

	async fn revoke_locked(
		&self,
		credential_id: &str,
		expected_merchant: Option<&MerchantId>,
	) -> Result<()> {
		let mut credential = match self.credentials.get_by_key(credential_id).await? {
			Some(credential) => credential,
			None => {
				return Err(CredentialError::NotFound(format!(
					"credential {credential_id}"
				)))
			}
		};

		if let Some(expected) = expected_merchant {
			if credential.merchant_id() != Some(expected) {
				return Err(CredentialError::OwnerMismatch {
					credential_id: credential_id.to_string(),
					merchant_id: expected.to_string(),
				});
			}
		}

		match credential.status {
			CredentialStatus::Active => {}
			CredentialStatus::Revoked => return Ok(()),
			other => {
				return Err(CredentialError::InvalidState(format!(
					"cannot revoke a {other} credential"
				)))
			}
		}

		let now = Utc::now();
		credential.transition_to(CredentialStatus::Revoked, now)?;
		self.credentials.update(&credential).await?;

		// The secret record must match the metadata row. If this write
		// fails the operation is reported failed; the stores are
		// detectably inconsistent until an operator retries.
		self.mirror_status(&credential, CredentialStatus::Revoked, now)
			.await?;

		tracing::info!(credential_id = %credential_id, "credential revoked");
		Ok(())
	}

	/// Update mutable fields of an active credential.
	#[tracing::instrument(skip(self, changes), fields(credential_id = %credential_id))]
	pub async fn update(
		&self,
		credential_id: &str,
		changes: toll_credentials_core::CredentialUpdate,
		expected_merchant: Option<&MerchantId>,
	) -> Result<Credential> {
		let mut credential = self.get_owned(credential_id, expected_merchant).await?;

		if credential.status != CredentialStatus::Active {
			return Err(CredentialError::InvalidState(format!(
				"cannot update a {} credential",
				credential.status
			)));
		}

		if let Some(endpoints) = &changes.allowed_endpoints {
			if !credential.is_admin() {
				self.reject_admin_patterns(endpoints)?;
			}
		}

		if let Some(name) = changes.name {
			credential.name = name;
		}
		if let Some(description) = changes.description {
			credential.description = Some(description);
		}
		if let Some(purpose) = changes.purpose {
			credential.purpose = Some(purpose);
		}
		if let Some(rate_limit) = changes.rate_limit {
			credential.rate_limit = rate_limit;
		}
		if let Some(endpoints) = changes.allowed_endpoints {
			credential.allowed_endpoints = endpoints;
		}
		if let Some(expires_at) = changes.expires_at {
			credential.expires_at = expires_at;
		}
		credential.updated_at = Utc::now();

		self.credentials.update(&credential).await?;
		Ok(credential)
	}

	fn lock_for(&self, credential_id: &str) -> Arc<Mutex<()>> {
		self.locks
			.entry(credential_id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.value()
			.clone()
	}

	/// Drop the lock-map entry once no other task holds a clone of it,
	/// so entries do not accumulate for every credential ever rotated
	/// or revoked. A waiting task holds its own clone and keeps the
	/// strong count above two, which blocks the removal.
	fn release_lock(&self, credential_id: &str, lock: &Arc<Mutex<()>>) {
		self.locks.remove_if(credential_id, |_, held| {
			Arc::ptr_eq(held, lock) && Arc::strong_count(held) == 2
		});
	}

	async fn get_owned(
		&self,
		credential_id: &str,
		expected_merchant: Option<&MerchantId>,
	) -> Result<Credential> {
		let credential = self
			.credentials
			.get_by_key(credential_id)
			.await?
			.ok_or_else(|| CredentialError::NotFound(format!("credential {credential_id}")))?;

		if let Some(expected) = expected_merchant {
			if credential.merchant_id() != Some(expected) {
				return Err(CredentialError::NotFound(format!(
					"credential {credential_id}"
				)));
			}
		}
		Ok(credential)
	}

	fn secret_name(&self, credential: &Credential) -> String {
		match credential.merchant_id() {
			Some(merchant) => self.namer.merchant_secret(merchant, &credential.id),
			None => self.namer.service_secret(&self.config.service_name),
		}
	}

	async fn flip_rotated(&self, current: &mut Credential, now: DateTime<Utc>) -> Result<()> {
		current.transition_to(CredentialStatus::Rotated, now)?;
		self.credentials.update(current).await?;
		Ok(())
	}

	async fn mirror_status(
		&self,
		credential: &Credential,
		status: CredentialStatus,
		now: DateTime<Utc>,
	) -> Result<()> {
		let name = self.secret_name(credential);
		let mut record = self
			.secrets
			.get(&name)
			.await?
			.ok_or_else(|| CredentialError::NotFound(format!("secret {name}")))?;
		record.mark_status(status, now);
		self.secrets.update(&name, &record).await?;
		Ok(())
	}

	/// Best-effort rollback of a half-finished rotation.
	async fn compensate_revoke(&self, replacement: &Credential, now: DateTime<Utc>) {
		let mut replacement = replacement.clone();
		if replacement
			.transition_to(CredentialStatus::Revoked, now)
			.is_err()
		{
			return;
		}
		if let Err(e) = self.credentials.update(&replacement).await {
			tracing::warn!(
				credential_id = %replacement.id,
				error = %e,
				"rotation compensation failed; manual cleanup required"
			);
		}
	}

	fn reject_admin_patterns(&self, endpoints: &[String]) -> Result<()> {
		for endpoint in endpoints {
			for admin_pattern in &self.config.admin_endpoint_patterns {
				if pattern_covers(admin_pattern, endpoint) {
					return Err(CredentialError::InvalidArgument(format!(
						"endpoint pattern {endpoint} is restricted to administrative credentials"
					)));
				}
			}
		}
		Ok(())
	}
}

/// Whether `pattern` (possibly ending in `*`) covers `endpoint`.
fn pattern_covers(pattern: &str, endpoint: &str) -> bool {
	match pattern.strip_suffix('*') {
		Some(prefix) => endpoint.starts_with(prefix) || endpoint == pattern,
		None => endpoint == pattern,
	}
}

/// Deduplicate `base` against `taken` case-insensitively by appending a
/// numeric suffix: `name`, `name (2)`, `name (3)`, ...
fn unique_name(base: &str, taken: &[String]) -> String {
	let lowered: Vec<String> = taken.iter().map(|n| n.to_lowercase()).collect();
	if !lowered.contains(&base.to_lowercase()) {
		return base.to_string();
	}
	let mut n = 2;
	loop {
		let candidate = format!("{base} ({n})");
		if !lowered.contains(&candidate.to_lowercase()) {
			return candidate;
		}
		n += 1;
	}
}

/// 64 bytes of OS randomness, base64-rendered.
fn generate_secret() -> SecretValue {
	let mut bytes = [0u8; SECRET_BYTES];
	rand::rngs::OsRng.fill_bytes(&mut bytes);
	SecretValue::new(BASE64.encode(bytes))
}
