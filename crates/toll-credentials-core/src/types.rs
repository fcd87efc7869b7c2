// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ID newtypes, credential status state machine, and scope.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Number of random bytes behind a generated credential id.
pub const CREDENTIAL_ID_BYTES: usize = 32;

macro_rules! define_token_id {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Wrap an existing identifier string.
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			/// Get the identifier as a string slice.
			#[must_use]
			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// Consume and return the inner string.
			#[must_use]
			pub fn into_inner(self) -> String {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(id)
			}
		}

		impl From<$name> for String {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_token_id!(
	CredentialId,
	"Opaque unique key identifying a credential. Immutable once issued."
);
define_token_id!(MerchantId, "External identifier of a merchant account.");

impl CredentialId {
	/// Generate a fresh credential id from 32 bytes of OS randomness,
	/// rendered as lowercase hex.
	#[must_use]
	pub fn generate() -> Self {
		let mut bytes = [0u8; CREDENTIAL_ID_BYTES];
		rand::rngs::OsRng.fill_bytes(&mut bytes);
		Self(hex::encode(bytes))
	}
}

/// Lifecycle status of a credential.
///
/// `Active` is the only state that passes request validation. The other
/// three are terminal: rotated and revoked credentials are retained for
/// audit, expired ones are flipped by the sweeper or lazily on validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatus {
	/// Credential is live and may validate requests.
	Active,
	/// Superseded by a rotation; an `Active` sibling exists.
	Rotated,
	/// Explicitly revoked by an operator or the owning merchant.
	Revoked,
	/// Past its `expires_at` instant.
	Expired,
}

impl CredentialStatus {
	/// Returns all statuses.
	pub fn all() -> &'static [CredentialStatus] {
		&[
			CredentialStatus::Active,
			CredentialStatus::Rotated,
			CredentialStatus::Revoked,
			CredentialStatus::Expired,
		]
	}

	/// The canonical string stored in the database.
	#[must_use]
	pub fn as_str(&self) -> &'static str {
		match self {
			CredentialStatus::Active => "ACTIVE",
			CredentialStatus::Rotated => "ROTATED",
			CredentialStatus::Revoked => "REVOKED",
			CredentialStatus::Expired => "EXPIRED",
		}
	}

	/// True for states no transition may leave.
	#[must_use]
	pub fn is_terminal(&self) -> bool {
		!matches!(self, CredentialStatus::Active)
	}

	/// Whether the state machine permits moving from `self` to `target`.
	///
	/// Only `Active` has outgoing edges; `Rotated`, `Revoked` and
	/// `Expired` are terminal.
	#[must_use]
	pub fn can_transition_to(&self, target: CredentialStatus) -> bool {
		matches!(self, CredentialStatus::Active) && target != CredentialStatus::Active
	}
}

impl fmt::Display for CredentialStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for CredentialStatus {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ACTIVE" => Ok(CredentialStatus::Active),
			"ROTATED" => Ok(CredentialStatus::Rotated),
			"REVOKED" => Ok(CredentialStatus::Revoked),
			"EXPIRED" => Ok(CredentialStatus::Expired),
			other => Err(CoreError::InvalidStatus(other.to_string())),
		}
	}
}

/// Who a credential acts for.
///
/// Exactly one of the two cases holds for every credential; there is no
/// string-typed scope field to drift out of sync with the merchant id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum CredentialScope {
	/// Cross-merchant administrative credential. No merchant id.
	Admin,
	/// Credential owned by a single merchant.
	Merchant {
		/// The owning merchant.
		merchant_id: MerchantId,
	},
}

impl CredentialScope {
	/// Construct a merchant scope.
	pub fn merchant(id: impl Into<String>) -> Self {
		CredentialScope::Merchant {
			merchant_id: MerchantId::new(id),
		}
	}

	/// Returns true for administrative credentials.
	#[must_use]
	pub fn is_admin(&self) -> bool {
		matches!(self, CredentialScope::Admin)
	}

	/// The owning merchant, if merchant-scoped.
	#[must_use]
	pub fn merchant_id(&self) -> Option<&MerchantId> {
		match self {
			CredentialScope::Admin => None,
			CredentialScope::Merchant { merchant_id } => Some(merchant_id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::collections::HashSet;
	use std::str::FromStr;

	#[test]
	fn status_round_trips_through_strings() {
		for status in CredentialStatus::all() {
			let parsed = CredentialStatus::from_str(status.as_str()).unwrap();
			assert_eq!(*status, parsed);
		}
	}

	#[test]
	fn unknown_status_is_rejected() {
		assert!(CredentialStatus::from_str("active").is_err());
		assert!(CredentialStatus::from_str("").is_err());
	}

	#[test]
	fn only_active_has_outgoing_transitions() {
		for target in CredentialStatus::all() {
			assert_eq!(
				CredentialStatus::Active.can_transition_to(*target),
				*target != CredentialStatus::Active
			);
			assert!(!CredentialStatus::Rotated.can_transition_to(*target));
			assert!(!CredentialStatus::Revoked.can_transition_to(*target));
			assert!(!CredentialStatus::Expired.can_transition_to(*target));
		}
	}

	#[test]
	fn scope_exposes_merchant_id_only_for_merchants() {
		let admin = CredentialScope::Admin;
		assert!(admin.is_admin());
		assert!(admin.merchant_id().is_none());

		let scoped = CredentialScope::merchant("m-123");
		assert!(!scoped.is_admin());
		assert_eq!(scoped.merchant_id().unwrap().as_str(), "m-123");
	}

	proptest! {
		#[test]
		fn credential_id_generation_is_unique(count in 1..500usize) {
			let mut seen = HashSet::new();
			for _ in 0..count {
				let id = CredentialId::generate();
				prop_assert_eq!(id.as_str().len(), CREDENTIAL_ID_BYTES * 2);
				prop_assert!(seen.insert(id.into_inner()), "duplicate credential id");
			}
		}
	}
}
