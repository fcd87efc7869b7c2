// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Engine configuration.

use serde::Deserialize;
use toll_server_db::SecretNamer;

/// Tunables for the credential engine. Deserialized from the server's
/// configuration file; every field has a production default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Maximum simultaneously active credentials per merchant.
	pub max_active_per_merchant: usize,
	/// Replay and timestamp-skew window, in minutes.
	pub replay_window_minutes: i64,
	/// Interval between expiration sweeps, in seconds.
	pub sweep_interval_secs: u64,
	/// Lifetime of newly issued credentials, in days.
	pub credential_expiry_days: i64,
	/// Secret-name prefix for merchant credentials.
	pub merchant_secret_prefix: String,
	/// Secret-name prefix for administrative (service) secrets.
	pub service_secret_prefix: String,
	/// Service name the admin secret is stored under.
	pub service_name: String,
	/// Rate limit applied when an issue request does not state one.
	pub default_rate_limit: i64,
	/// Endpoint patterns only administrative credentials may carry.
	pub admin_endpoint_patterns: Vec<String>,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			max_active_per_merchant: 5,
			replay_window_minutes: 5,
			sweep_interval_secs: 3600,
			credential_expiry_days: 365,
			merchant_secret_prefix: "cred".to_string(),
			service_secret_prefix: "svc".to_string(),
			service_name: "toll-platform".to_string(),
			default_rate_limit: 1000,
			admin_endpoint_patterns: vec!["/admin/*".to_string()],
		}
	}
}

impl EngineConfig {
	/// The secret namer matching this configuration's prefixes.
	#[must_use]
	pub fn secret_namer(&self) -> SecretNamer {
		SecretNamer::new(
			self.merchant_secret_prefix.clone(),
			self.service_secret_prefix.clone(),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_production_policy() {
		let config = EngineConfig::default();
		assert_eq!(config.max_active_per_merchant, 5);
		assert_eq!(config.replay_window_minutes, 5);
		assert_eq!(config.sweep_interval_secs, 3600);
		assert_eq!(config.admin_endpoint_patterns, vec!["/admin/*"]);
	}

	#[test]
	fn partial_config_fills_in_defaults() {
		let config: EngineConfig =
			serde_json::from_str(r#"{"max_active_per_merchant": 2}"#).unwrap();
		assert_eq!(config.max_active_per_merchant, 2);
		assert_eq!(config.credential_expiry_days, 365);
	}
}
