// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sliding-window replay protection for signed requests.
//!
//! The guard is consulted on every authenticated request, concurrently
//! from many request handlers. Nonces live in a [`DashMap`] so unrelated
//! nonces never contend on one lock, and the check-then-insert for a
//! single nonce is atomic via the entry API: two simultaneous requests
//! carrying the same nonce can never both be accepted.
//!
//! The guard is an explicitly constructed component, built once at process
//! start and shared behind an `Arc`; tests construct their own instance
//! with a fake clock.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Default window for timestamp skew and nonce retention.
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Tracks recently seen nonces and rejects requests outside the window.
pub struct ReplayGuard {
	seen: DashMap<String, DateTime<Utc>>,
	window: Duration,
	clock: Clock,
}

impl ReplayGuard {
	/// Create a guard with the given window in minutes.
	#[must_use]
	pub fn new(window_minutes: i64) -> Self {
		Self::with_clock(window_minutes, Arc::new(Utc::now))
	}

	/// Create a guard with an injected clock. Test seam.
	#[must_use]
	pub fn with_clock(window_minutes: i64, clock: Clock) -> Self {
		Self {
			seen: DashMap::new(),
			window: Duration::minutes(window_minutes),
			clock,
		}
	}

	/// Atomically check a `(timestamp, nonce)` pair and record the nonce
	/// if it is fresh.
	///
	/// Rejects (returns `false`) when:
	/// - the timestamp is not RFC 3339
	/// - `|now - timestamp|` exceeds the window (skew in either direction)
	/// - the nonce was already accepted within the window
	pub fn check_and_record(&self, timestamp: &str, nonce: &str) -> bool {
		let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) else {
			tracing::debug!("replay check rejected unparseable timestamp");
			return false;
		};
		let instant = parsed.with_timezone(&Utc);

		let now = (self.clock)();
		if (now - instant).abs() > self.window {
			tracing::debug!("replay check rejected timestamp outside window");
			return false;
		}

		self.purge(now);

		match self.seen.entry(nonce.to_string()) {
			dashmap::mapref::entry::Entry::Occupied(_) => {
				tracing::debug!("replay check rejected reused nonce");
				false
			}
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				slot.insert(now);
				true
			}
		}
	}

	/// Number of nonces currently retained.
	#[must_use]
	pub fn len(&self) -> usize {
		self.seen.len()
	}

	/// True when no nonces are retained.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.seen.is_empty()
	}

	fn purge(&self, now: DateTime<Utc>) {
		self.seen.retain(|_, first_seen| now - *first_seen <= self.window);
	}
}

impl Default for ReplayGuard {
	fn default() -> Self {
		Self::new(DEFAULT_WINDOW_MINUTES)
	}
}
