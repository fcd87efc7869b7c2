// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The persisted credential metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{CredentialId, CredentialScope, CredentialStatus, MerchantId};

/// Non-secret metadata for an API credential.
///
/// The HMAC key material itself lives in the secret store under a name
/// derived from this record; see [`crate::secret::SecretRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
	pub id: CredentialId,
	pub scope: CredentialScope,

	pub name: String,
	pub description: Option<String>,
	/// Free-text statement of what the credential is for.
	pub purpose: Option<String>,

	pub status: CredentialStatus,

	/// Requests per hour granted to this credential.
	pub rate_limit: i64,
	/// Path patterns this credential may call.
	pub allowed_endpoints: Vec<String>,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
	pub last_rotated_at: Option<DateTime<Utc>>,
	pub last_used_at: Option<DateTime<Utc>>,
	pub revoked_at: Option<DateTime<Utc>>,

	/// Reference into the onboarding system that provisioned the merchant.
	pub onboarding_reference: Option<String>,
	pub onboarding_timestamp: Option<DateTime<Utc>>,
}

impl Credential {
	/// Returns true for administrative (cross-merchant) credentials.
	#[must_use]
	pub fn is_admin(&self) -> bool {
		self.scope.is_admin()
	}

	/// The owning merchant, if merchant-scoped.
	#[must_use]
	pub fn merchant_id(&self) -> Option<&MerchantId> {
		self.scope.merchant_id()
	}

	/// Whether the credential's expiry instant has passed at `now`.
	///
	/// A credential can be past expiry while still recorded `Active`; the
	/// sweeper (or lazy validation) flips the status afterwards.
	#[must_use]
	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		self.expires_at < now
	}

	/// Apply a status transition, enforcing the state machine.
	///
	/// # Errors
	///
	/// Returns [`CoreError::InvalidTransition`] if the current status is
	/// terminal or the target equals the current status.
	pub fn transition_to(
		&mut self,
		target: CredentialStatus,
		now: DateTime<Utc>,
	) -> Result<(), CoreError> {
		if !self.status.can_transition_to(target) {
			return Err(CoreError::InvalidTransition {
				from: self.status.to_string(),
				to: target.to_string(),
			});
		}
		self.status = target;
		self.updated_at = now;
		match target {
			CredentialStatus::Revoked => self.revoked_at = Some(now),
			CredentialStatus::Rotated => self.last_rotated_at = Some(now),
			_ => {}
		}
		Ok(())
	}
}

/// Mutable fields accepted by a credential update.
///
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialUpdate {
	pub name: Option<String>,
	pub description: Option<String>,
	pub purpose: Option<String>,
	pub rate_limit: Option<i64>,
	pub allowed_endpoints: Option<Vec<String>>,
	pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialUpdate {
	/// True when no field would change.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.name.is_none()
			&& self.description.is_none()
			&& self.purpose.is_none()
			&& self.rate_limit.is_none()
			&& self.allowed_endpoints.is_none()
			&& self.expires_at.is_none()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn sample(status: CredentialStatus) -> Credential {
		let now = Utc::now();
		Credential {
			id: CredentialId::generate(),
			scope: CredentialScope::merchant("m-1"),
			name: "Production key".to_string(),
			description: None,
			purpose: Some("surcharge quotes".to_string()),
			status,
			rate_limit: 1000,
			allowed_endpoints: vec!["/v1/surcharge/*".to_string()],
			created_at: now,
			updated_at: now,
			expires_at: now + Duration::days(365),
			last_rotated_at: None,
			last_used_at: None,
			revoked_at: None,
			onboarding_reference: None,
			onboarding_timestamp: None,
		}
	}

	#[test]
	fn revoke_transition_stamps_revoked_at() {
		let mut cred = sample(CredentialStatus::Active);
		let now = Utc::now();
		cred.transition_to(CredentialStatus::Revoked, now).unwrap();
		assert_eq!(cred.status, CredentialStatus::Revoked);
		assert_eq!(cred.revoked_at, Some(now));
		assert_eq!(cred.updated_at, now);
	}

	#[test]
	fn rotate_transition_stamps_last_rotated_at() {
		let mut cred = sample(CredentialStatus::Active);
		let now = Utc::now();
		cred.transition_to(CredentialStatus::Rotated, now).unwrap();
		assert_eq!(cred.last_rotated_at, Some(now));
	}

	#[test]
	fn terminal_states_reject_transitions() {
		for status in [
			CredentialStatus::Rotated,
			CredentialStatus::Revoked,
			CredentialStatus::Expired,
		] {
			let mut cred = sample(status);
			let err = cred
				.transition_to(CredentialStatus::Expired, Utc::now())
				.unwrap_err();
			assert!(matches!(err, CoreError::InvalidTransition { .. }));
		}
	}

	#[test]
	fn expiry_check_is_strict() {
		let cred = sample(CredentialStatus::Active);
		assert!(!cred.is_expired_at(cred.expires_at));
		assert!(cred.is_expired_at(cred.expires_at + Duration::seconds(1)));
	}
}
