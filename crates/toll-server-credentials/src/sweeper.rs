// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background sweep that expires stale credentials.
//!
//! One long-lived tokio task per process. Each tick flips every `Active`
//! credential whose `expires_at` has passed to `Expired`; a failure on
//! one row is logged and does not block the rest of the batch, and a
//! failed tick does not prevent the next one. Shutdown is signalled over
//! a broadcast channel; an in-flight batch finishes before the task
//! exits.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use toll_credentials_core::CredentialStatus;
use toll_server_db::CredentialStore;

/// Periodic expiration sweep over the credential repository.
pub struct ExpirationSweeper {
	credentials: Arc<dyn CredentialStore>,
	interval: Duration,
	shutdown_tx: broadcast::Sender<()>,
}

impl ExpirationSweeper {
	pub fn new(credentials: Arc<dyn CredentialStore>, interval: Duration) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			credentials,
			interval,
			shutdown_tx,
		}
	}

	/// Spawn the sweep loop. Runs until [`shutdown`](Self::shutdown).
	pub fn start(&self) -> JoinHandle<()> {
		let credentials = Arc::clone(&self.credentials);
		let interval = self.interval;
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						let _ = sweep_once(credentials.as_ref()).await;
					}
					_ = shutdown_rx.recv() => {
						info!("shutting down expiration sweeper");
						break;
					}
				}
			}
		})
	}

	/// Signal the sweep loop to stop after any in-flight batch.
	pub fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());
	}

	/// Run one sweep immediately. Returns the number of credentials
	/// flipped to `Expired`.
	pub async fn sweep_once(&self) -> usize {
		sweep_once(self.credentials.as_ref()).await
	}
}

async fn sweep_once(credentials: &dyn CredentialStore) -> usize {
	let now = Utc::now();
	let overdue = match credentials.list_expired(now).await {
		Ok(overdue) => overdue,
		Err(e) => {
			warn!(error = %e, "expiration sweep query failed");
			return 0;
		}
	};

	let mut flipped = 0;
	for mut credential in overdue {
		if credential
			.transition_to(CredentialStatus::Expired, now)
			.is_err()
		{
			continue;
		}
		match credentials.update(&credential).await {
			Ok(()) => {
				info!(credential_id = %credential.id, "credential expired");
				flipped += 1;
			}
			Err(e) => {
				warn!(
					credential_id = %credential.id,
					error = %e,
					"failed to expire credential, will retry next sweep"
				);
			}
		}
	}
	flipped
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration as ChronoDuration;
	use toll_credentials_core::{Credential, CredentialId, CredentialScope};
	use toll_server_db::testing::{create_credentials_table, create_test_pool};
	use toll_server_db::CredentialRepository;

	fn credential(name: &str, expires_in_hours: i64) -> Credential {
		let now = Utc::now();
		Credential {
			id: CredentialId::generate(),
			scope: CredentialScope::merchant("m-1"),
			name: name.to_string(),
			description: None,
			purpose: None,
			status: CredentialStatus::Active,
			rate_limit: 1000,
			allowed_endpoints: Vec::new(),
			created_at: now,
			updated_at: now,
			expires_at: now + ChronoDuration::hours(expires_in_hours),
			last_rotated_at: None,
			last_used_at: None,
			revoked_at: None,
			onboarding_reference: None,
			onboarding_timestamp: None,
		}
	}

	async fn make_repo() -> CredentialRepository {
		let pool = create_test_pool().await;
		create_credentials_table(&pool).await;
		CredentialRepository::new(pool)
	}

	#[tokio::test]
	async fn sweep_flips_exactly_the_overdue_active_rows() {
		let repo = make_repo().await;
		let overdue_a = credential("a", -2);
		let overdue_b = credential("b", -1);
		let fresh = credential("c", 24);
		repo.create(&overdue_a).await.unwrap();
		repo.create(&overdue_b).await.unwrap();
		repo.create(&fresh).await.unwrap();

		let sweeper = ExpirationSweeper::new(
			Arc::new(repo.clone()),
			Duration::from_secs(3600),
		);
		assert_eq!(sweeper.sweep_once().await, 2);

		for id in [&overdue_a.id, &overdue_b.id] {
			let stored = repo.get_by_key(id.as_str()).await.unwrap().unwrap();
			assert_eq!(stored.status, CredentialStatus::Expired);
		}
		let stored = repo.get_by_key(fresh.id.as_str()).await.unwrap().unwrap();
		assert_eq!(stored.status, CredentialStatus::Active);
	}

	#[tokio::test]
	async fn sweep_is_a_no_op_when_nothing_is_overdue() {
		let repo = make_repo().await;
		repo.create(&credential("fresh", 24)).await.unwrap();

		let sweeper = ExpirationSweeper::new(
			Arc::new(repo),
			Duration::from_secs(3600),
		);
		assert_eq!(sweeper.sweep_once().await, 0);
	}

	#[tokio::test]
	async fn shutdown_stops_the_loop_promptly() {
		let repo = make_repo().await;
		let sweeper = ExpirationSweeper::new(
			Arc::new(repo),
			Duration::from_secs(3600),
		);

		let handle = sweeper.start();
		sweeper.shutdown();
		tokio::time::timeout(Duration::from_secs(1), handle)
			.await
			.expect("sweeper did not stop after shutdown")
			.unwrap();
	}

	#[tokio::test]
	async fn periodic_ticks_expire_rows_without_manual_triggering() {
		let repo = make_repo().await;
		let overdue = credential("overdue", -1);
		repo.create(&overdue).await.unwrap();

		let sweeper = ExpirationSweeper::new(
			Arc::new(repo.clone()),
			Duration::from_millis(20),
		);
		let handle = sweeper.start();

		tokio::time::sleep(Duration::from_millis(100)).await;
		sweeper.shutdown();
		let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

		let stored = repo
			.get_by_key(overdue.id.as_str())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stored.status, CredentialStatus::Expired);
	}
}
