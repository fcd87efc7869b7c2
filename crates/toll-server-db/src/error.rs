// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error type shared by the credential, secret and merchant stores.
//!
//! `NotFound` and `Conflict` carry the row or secret-name key they refer
//! to so callers can surface which store diverged; `Internal` covers rows
//! that fail invariant checks when parsed back out of SQLite.

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	/// The underlying SQLite call failed.
	#[error("credential store query failed: {0}")]
	Sqlx(#[from] sqlx::Error),

	/// No row or secret record under the given key.
	#[error("no record for {0}")]
	NotFound(String),

	/// A secret name or credential id is already taken.
	#[error("record already exists for {0}")]
	Conflict(String),

	/// A stored row violated an invariant when read back, for example a
	/// non-admin credential row without a merchant id.
	#[error("corrupt stored record: {0}")]
	Internal(String),

	/// A secret record or endpoint-list column failed to encode or decode.
	#[error("record serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
