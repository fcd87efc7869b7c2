// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error taxonomy for credential lifecycle operations.
//!
//! Lifecycle operations surface typed errors for business-level handling
//! and HTTP status mapping. The validation entry point never uses these;
//! it collapses every rejection to `false`.

use thiserror::Error;
use toll_server_db::DbError;

/// Errors from credential lifecycle operations.
#[derive(Debug, Error)]
pub enum CredentialError {
	/// Credential or merchant absent
	#[error("not found: {0}")]
	NotFound(String),

	/// Credential belongs to a different merchant than stated
	#[error("credential {credential_id} does not belong to merchant {merchant_id}")]
	OwnerMismatch {
		credential_id: String,
		merchant_id: String,
	},

	/// Operation not permitted for the credential's current status
	#[error("invalid state: {0}")]
	InvalidState(String),

	/// Per-merchant active-credential cap reached
	#[error("merchant {merchant_id} already has {limit} active credentials")]
	LimitExceeded { merchant_id: String, limit: usize },

	/// Malformed input or forbidden endpoint pattern
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// Storage fault
	#[error(transparent)]
	Db(#[from] DbError),

	/// Core invariant violation
	#[error(transparent)]
	Core(#[from] toll_credentials_core::CoreError),
}

pub type Result<T> = std::result::Result<T, CredentialError>;
