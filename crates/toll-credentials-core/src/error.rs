// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the core credential model.

use thiserror::Error;

/// Errors that can occur while working with core credential types.
#[derive(Debug, Error)]
pub enum CoreError {
	/// Unknown credential status string
	#[error("invalid credential status: {0}")]
	InvalidStatus(String),

	/// Transition forbidden by the status state machine
	#[error("invalid status transition: {from} -> {to}")]
	InvalidTransition {
		/// Current status
		from: String,
		/// Requested status
		to: String,
	},

	/// Serialization error
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
