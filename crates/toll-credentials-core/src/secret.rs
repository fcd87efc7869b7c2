// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret key material and the record persisted in the secret store.
//!
//! # Security Notes
//!
//! - [`SecretValue`] zeroizes its buffer on drop and redacts `Debug`
//! - Secret values are returned to the caller exactly once, at issuance or
//!   rotation, and are never retrievable in plaintext afterwards
//! - Never log a secret; tracing spans in this workspace skip secret args

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{CredentialId, CredentialStatus, MerchantId};

/// Shared HMAC key material for one credential.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
	/// Wrap existing key material.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Expose the key material for signing.
	#[must_use]
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// True when no key material is present. An empty secret must never
	/// be used to sign; see the signature engine preconditions.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl std::fmt::Debug for SecretValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("SecretValue(REDACTED)")
	}
}

impl PartialEq for SecretValue {
	fn eq(&self, other: &Self) -> bool {
		// Test convenience only; authentication paths compare signatures,
		// not secrets, and do so in constant time.
		self.0 == other.0
	}
}

/// The JSON document stored in the secret store, addressed by derived name.
///
/// `status`, `is_revoked` and `revoked_at` mirror the credential row; the
/// lifecycle manager keeps the two consistent or reports the operation
/// failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
	pub credential_id: CredentialId,
	pub secret_value: SecretValue,
	pub merchant_id: Option<MerchantId>,
	pub status: CredentialStatus,
	pub is_revoked: bool,
	pub revoked_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub last_rotated: Option<DateTime<Utc>>,
}

impl SecretRecord {
	/// Build an active record for a freshly issued credential.
	#[must_use]
	pub fn new_active(
		credential_id: CredentialId,
		secret_value: SecretValue,
		merchant_id: Option<MerchantId>,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			credential_id,
			secret_value,
			merchant_id,
			status: CredentialStatus::Active,
			is_revoked: false,
			revoked_at: None,
			created_at: now,
			last_rotated: None,
		}
	}

	/// Mirror a credential status change into this record.
	pub fn mark_status(&mut self, status: CredentialStatus, now: DateTime<Utc>) {
		self.status = status;
		match status {
			CredentialStatus::Revoked => {
				self.is_revoked = true;
				self.revoked_at = Some(now);
			}
			CredentialStatus::Rotated => self.last_rotated = Some(now),
			_ => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn debug_never_prints_key_material() {
		let secret = SecretValue::new("super-sensitive-hmac-key");
		let rendered = format!("{secret:?}");
		assert!(!rendered.contains("super-sensitive"));
		assert!(rendered.contains("REDACTED"));
	}

	#[test]
	fn record_serializes_with_camel_case_keys() {
		let record = SecretRecord::new_active(
			CredentialId::new("abc"),
			SecretValue::new("key"),
			Some(MerchantId::new("m-1")),
			Utc::now(),
		);
		let json = serde_json::to_string(&record).unwrap();
		assert!(json.contains("\"credentialId\""));
		assert!(json.contains("\"isRevoked\":false"));
	}

	#[test]
	fn mark_revoked_sets_both_flags() {
		let mut record = SecretRecord::new_active(
			CredentialId::new("abc"),
			SecretValue::new("key"),
			None,
			Utc::now(),
		);
		let now = Utc::now();
		record.mark_status(CredentialStatus::Revoked, now);
		assert!(record.is_revoked);
		assert_eq!(record.revoked_at, Some(now));
		assert_eq!(record.status, CredentialStatus::Revoked);
	}
}
