// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Merchant existence checks.
//!
//! Merchant CRUD lives elsewhere; credential issuance only needs to know
//! whether the stated merchant exists, so that is the whole contract.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use toll_credentials_core::MerchantId;

use crate::error::DbError;

/// Minimal merchant lookup used by credential issuance.
#[async_trait]
pub trait MerchantDirectory: Send + Sync {
	async fn exists(&self, merchant_id: &MerchantId) -> Result<bool, DbError>;
}

/// SQLite-backed merchant directory over the platform's merchants table.
#[derive(Clone)]
pub struct MerchantRepository {
	pool: SqlitePool,
}

impl MerchantRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl MerchantDirectory for MerchantRepository {
	#[tracing::instrument(skip(self), fields(merchant_id = %merchant_id))]
	async fn exists(&self, merchant_id: &MerchantId) -> Result<bool, DbError> {
		let row = sqlx::query("SELECT COUNT(1) AS n FROM merchants WHERE id = ?")
			.bind(merchant_id.as_str())
			.fetch_one(&self.pool)
			.await?;
		let count: i64 = row.get("n");
		Ok(count > 0)
	}
}
