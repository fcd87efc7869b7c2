// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authentication entry point for signed requests.
//!
//! # Authentication Flow
//!
//! ```text
//! Request → Field presence → Replay guard → Credential lookup → Expiry
//!         → Scope branch (from the stored credential, never the caller)
//!         → Secret lookup by derived name → Signature verify → bool
//! ```
//!
//! Every rejection collapses to `false`; the HTTP layer maps that to a
//! transport error without learning which check failed. A `Revoked`
//! credential is deliberately not rejected here; the business layer
//! applies its own revoked-key policy after authentication.

use chrono::Utc;
use std::sync::Arc;
use toll_credentials_core::CredentialStatus;
use toll_server_db::{CredentialStore, SecretNamer, SecretStore};

use crate::replay::ReplayGuard;
use crate::signature;

/// The signed fields of an inbound request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
	/// Owning merchant, or empty for administrative calls.
	pub merchant_id: String,
	pub credential_id: String,
	/// RFC 3339 UTC instant the caller signed.
	pub timestamp: String,
	/// Caller-supplied unique token.
	pub nonce: String,
	/// Base64 HMAC-SHA256 over the canonical string.
	pub signature: String,
	/// Used only to select the admin secret name.
	pub caller_service_name: String,
}

/// Validates signed requests against stored credentials and secrets.
///
/// Constructed once at process start and shared across request handlers;
/// all fields are cheaply cloneable handles.
pub struct RequestValidator {
	credentials: Arc<dyn CredentialStore>,
	secrets: Arc<dyn SecretStore>,
	namer: SecretNamer,
	replay: Arc<ReplayGuard>,
}

impl RequestValidator {
	pub fn new(
		credentials: Arc<dyn CredentialStore>,
		secrets: Arc<dyn SecretStore>,
		namer: SecretNamer,
		replay: Arc<ReplayGuard>,
	) -> Self {
		Self {
			credentials,
			secrets,
			namer,
			replay,
		}
	}

	/// Authenticate a signed request.
	///
	/// Returns `false` for every rejection: missing fields, replayed
	/// nonce, unknown credential, expiry, signature mismatch, and also
	/// for infrastructure faults (fail closed, logged at warn).
	///
	/// Side effect: a credential whose `expires_at` has passed is flipped
	/// to `Expired` in the repository before the request is rejected.
	#[tracing::instrument(skip(self, request), fields(credential_id = %request.credential_id))]
	pub async fn validate(&self, request: &SignedRequest) -> bool {
		if request.credential_id.is_empty()
			|| request.timestamp.is_empty()
			|| request.nonce.is_empty()
			|| request.signature.is_empty()
		{
			return false;
		}

		if !self
			.replay
			.check_and_record(&request.timestamp, &request.nonce)
		{
			return false;
		}

		let credential = match self.credentials.get_by_key(&request.credential_id).await {
			Ok(Some(credential)) => credential,
			Ok(None) => {
				tracing::debug!("validation rejected unknown credential");
				return false;
			}
			Err(e) => {
				tracing::warn!(error = %e, "credential lookup failed, rejecting");
				return false;
			}
		};

		let now = Utc::now();
		if credential.status == CredentialStatus::Expired {
			return false;
		}
		if credential.is_expired_at(now) {
			self.expire_lazily(credential).await;
			return false;
		}

		// Branch on the stored credential, not the caller-supplied
		// merchant id: the canonical form and secret name both follow
		// what was issued.
		let (secret_name, merchant_for_signature) = if credential.is_admin() {
			(
				self.namer.service_secret(&request.caller_service_name),
				None,
			)
		} else {
			match credential.merchant_id() {
				Some(merchant) => (
					self.namer.merchant_secret(merchant, &credential.id),
					Some(merchant),
				),
				None => return false,
			}
		};

		let record = match self.secrets.get(&secret_name).await {
			Ok(Some(record)) => record,
			Ok(None) => {
				tracing::debug!("validation rejected credential without secret");
				return false;
			}
			Err(e) => {
				tracing::warn!(error = %e, "secret lookup failed, rejecting");
				return false;
			}
		};

		let verified = match signature::verify(
			&request.signature,
			&record.secret_value,
			&request.timestamp,
			&request.nonce,
			merchant_for_signature,
			&credential.id,
		) {
			Ok(verified) => verified,
			Err(e) => {
				tracing::warn!(error = %e, "signature verification failed, rejecting");
				false
			}
		};

		if verified {
			if let Err(e) = self
				.credentials
				.touch_last_used(credential.id.as_str(), now)
				.await
			{
				tracing::warn!(error = %e, "failed to record credential use");
			}
		}

		verified
	}

	async fn expire_lazily(&self, mut credential: toll_credentials_core::Credential) {
		let now = Utc::now();
		if credential
			.transition_to(CredentialStatus::Expired, now)
			.is_err()
		{
			return;
		}
		if let Err(e) = self.credentials.update(&credential).await {
			tracing::warn!(
				credential_id = %credential.id,
				error = %e,
				"failed to persist lazy expiry"
			);
		} else {
			tracing::info!(credential_id = %credential.id, "credential lazily expired");
		}
	}
}
