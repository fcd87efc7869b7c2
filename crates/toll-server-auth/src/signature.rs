// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HMAC-SHA256 request signatures over a canonical string.
//!
//! The canonical string is the exact field-ordered, pipe-joined input to
//! the MAC:
//!
//! ```text
//! merchant:  timestamp|nonce|merchant_id|credential_id
//! admin:     timestamp|nonce|credential_id
//! ```
//!
//! The two forms are deliberately not interchangeable: an administrative
//! signature omits the owner field entirely rather than leaving it empty,
//! so a merchant signature can never validate against the admin secret or
//! vice versa.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use toll_credentials_core::{CredentialId, MerchantId, SecretValue};

type HmacSha256 = Hmac<Sha256>;

/// Errors from signature computation.
#[derive(Debug, Error)]
pub enum SignatureError {
	/// Signing with an empty secret is a precondition failure, never a
	/// silent zero-length signature.
	#[error("signing secret is empty")]
	EmptySecret,

	/// The secret could not be used as an HMAC key
	#[error("invalid HMAC key")]
	InvalidKey,
}

fn canonical_string(
	timestamp: &str,
	nonce: &str,
	merchant_id: Option<&MerchantId>,
	credential_id: &CredentialId,
) -> String {
	match merchant_id {
		Some(merchant) => format!("{timestamp}|{nonce}|{merchant}|{credential_id}"),
		None => format!("{timestamp}|{nonce}|{credential_id}"),
	}
}

/// Compute the base64 HMAC-SHA256 signature for a request.
///
/// Pass `None` for `merchant_id` when signing as an administrative
/// credential; the owner field is then omitted from the canonical string.
///
/// # Errors
///
/// Returns [`SignatureError::EmptySecret`] if `secret` holds no key
/// material.
pub fn sign(
	secret: &SecretValue,
	timestamp: &str,
	nonce: &str,
	merchant_id: Option<&MerchantId>,
	credential_id: &CredentialId,
) -> Result<String, SignatureError> {
	if secret.is_empty() {
		return Err(SignatureError::EmptySecret);
	}

	let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
		.map_err(|_| SignatureError::InvalidKey)?;
	mac.update(canonical_string(timestamp, nonce, merchant_id, credential_id).as_bytes());

	Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Recompute the expected signature and compare.
///
/// Comparison is case-insensitive over the base64 rendering and
/// constant-time over the bytes; timing safety is a correctness
/// requirement here, not hardening.
///
/// # Errors
///
/// Propagates [`SignatureError`] for precondition failures; a mismatched
/// signature is `Ok(false)`, not an error.
pub fn verify(
	signature: &str,
	secret: &SecretValue,
	timestamp: &str,
	nonce: &str,
	merchant_id: Option<&MerchantId>,
	credential_id: &CredentialId,
) -> Result<bool, SignatureError> {
	let expected = sign(secret, timestamp, nonce, merchant_id, credential_id)?;

	let provided = signature.to_ascii_lowercase();
	let expected = expected.to_ascii_lowercase();

	Ok(provided.as_bytes().ct_eq(expected.as_bytes()).into())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn secret() -> SecretValue {
		SecretValue::new("0123456789abcdef0123456789abcdef")
	}

	fn cred() -> CredentialId {
		CredentialId::new("cred-1")
	}

	#[test]
	fn merchant_canonical_string_contains_owner_field() {
		let merchant = MerchantId::new("m-1");
		assert_eq!(
			canonical_string("2026-01-01T00:00:00Z", "n-1", Some(&merchant), &cred()),
			"2026-01-01T00:00:00Z|n-1|m-1|cred-1"
		);
		assert_eq!(
			canonical_string("2026-01-01T00:00:00Z", "n-1", None, &cred()),
			"2026-01-01T00:00:00Z|n-1|cred-1"
		);
	}

	#[test]
	fn sign_rejects_empty_secret() {
		let empty = SecretValue::new("");
		let err = sign(&empty, "ts", "n", None, &cred()).unwrap_err();
		assert!(matches!(err, SignatureError::EmptySecret));
	}

	#[test]
	fn verify_accepts_the_signature_it_signed() {
		let merchant = MerchantId::new("m-1");
		let sig = sign(&secret(), "ts", "n", Some(&merchant), &cred()).unwrap();
		assert!(verify(&sig, &secret(), "ts", "n", Some(&merchant), &cred()).unwrap());
	}

	#[test]
	fn verify_is_case_insensitive_over_base64() {
		let sig = sign(&secret(), "ts", "n", None, &cred()).unwrap();
		assert!(verify(&sig.to_uppercase(), &secret(), "ts", "n", None, &cred()).unwrap());
	}

	#[test]
	fn admin_and_merchant_forms_are_not_interchangeable() {
		let merchant = MerchantId::new("m-1");
		let merchant_sig = sign(&secret(), "ts", "n", Some(&merchant), &cred()).unwrap();
		let admin_sig = sign(&secret(), "ts", "n", None, &cred()).unwrap();

		assert_ne!(merchant_sig, admin_sig);
		assert!(!verify(&merchant_sig, &secret(), "ts", "n", None, &cred()).unwrap());
		assert!(!verify(&admin_sig, &secret(), "ts", "n", Some(&merchant), &cred()).unwrap());
	}

	proptest! {
		#[test]
		fn round_trip_verifies(
			ts in "[0-9TZ:-]{10,25}",
			nonce in "[a-zA-Z0-9-]{1,40}",
			merchant in "[a-z0-9-]{1,20}",
			cred_id in "[a-f0-9]{8,64}",
			key in "[ -~]{1,80}",
		) {
			let secret = SecretValue::new(key);
			let merchant = MerchantId::new(merchant);
			let cred = CredentialId::new(cred_id);
			let sig = sign(&secret, &ts, &nonce, Some(&merchant), &cred).unwrap();
			prop_assert!(verify(&sig, &secret, &ts, &nonce, Some(&merchant), &cred).unwrap());
		}

		#[test]
		fn changing_any_field_breaks_verification(
			ts in "[0-9]{10,14}",
			nonce in "[a-z0-9]{8,32}",
		) {
			let merchant = MerchantId::new("m-1");
			let cred = cred();
			let sig = sign(&secret(), &ts, &nonce, Some(&merchant), &cred).unwrap();

			let other_ts = format!("{ts}0");
			prop_assert!(!verify(&sig, &secret(), &other_ts, &nonce, Some(&merchant), &cred).unwrap());

			let other_nonce = format!("{nonce}x");
			prop_assert!(!verify(&sig, &secret(), &ts, &other_nonce, Some(&merchant), &cred).unwrap());

			let other_merchant = MerchantId::new("m-2");
			prop_assert!(!verify(&sig, &secret(), &ts, &nonce, Some(&other_merchant), &cred).unwrap());

			let other_cred = CredentialId::new("cred-2");
			prop_assert!(!verify(&sig, &secret(), &ts, &nonce, Some(&merchant), &other_cred).unwrap());

			let other_secret = SecretValue::new("different-key-material");
			prop_assert!(!verify(&sig, &other_secret, &ts, &nonce, Some(&merchant), &cred).unwrap());
		}
	}
}
