//! Configuration types for the bundler.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete bundler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BundlerConfig {
	/// Batching, proof and timeout settings
	#[serde(default)]
	pub bundler: BundlerSettings,
	/// Archive storage backend
	#[serde(default)]
	pub storage: BackendConfig,
	/// Fair-ordering proof backend
	pub proof: BackendConfig,
	/// Quote source
	pub quote: BackendConfig,
	/// Chain submission
	pub delivery: BackendConfig,
	/// HTTP API
	#[serde(default)]
	pub api: ApiConfig,
}

/// Batching, proof and timeout settings.
///
/// Every field has a default so the `[bundler]` section may be partial.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BundlerSettings {
	/// Bundler name for logging
	pub name: String,
	/// Default chain intents execute on
	pub chain_id: u64,
	/// Maximum number of intents in a bundle
	pub bundle_max_size: usize,
	/// Age of the oldest pending intent that forces a close
	pub bundle_timeout_ms: u64,
	/// Maximum age of a proof at verification time
	pub proof_freshness_ms: u64,
	/// Bound on the caller-facing wait for a result
	pub submission_timeout_ms: u64,
	/// Period of the close-condition tick
	pub tick_interval_ms: u64,
	/// Bound on a single proof generation
	pub proof_timeout_ms: u64,
	/// Bound on a single quote-source call
	pub quote_timeout_ms: u64,
	/// Intent deadline, relative to creation
	pub intent_deadline_ms: u64,
	/// How long terminal intents and bundles stay in the active set
	pub retention_ms: u64,
	/// How long evicted entries stay in the archive; 0 keeps them forever
	pub archive_ttl_ms: u64,
	/// Event bus buffer size
	pub event_capacity: usize,
}

impl Default for BundlerSettings {
	fn default() -> Self {
		Self {
			name: "fair-bundler".to_string(),
			chain_id: 1,
			bundle_max_size: 5,
			bundle_timeout_ms: 10_000,
			proof_freshness_ms: 300_000,
			submission_timeout_ms: 30_000,
			tick_interval_ms: 1_000,
			proof_timeout_ms: 5_000,
			quote_timeout_ms: 5_000,
			intent_deadline_ms: 1_200_000,
			retention_ms: 3_600_000,
			archive_ttl_ms: 604_800_000,
			event_capacity: 1_000,
		}
	}
}

impl BundlerSettings {
	pub fn bundle_timeout(&self) -> Duration {
		Duration::from_millis(self.bundle_timeout_ms)
	}

	pub fn submission_timeout(&self) -> Duration {
		Duration::from_millis(self.submission_timeout_ms)
	}

	pub fn tick_interval(&self) -> Duration {
		Duration::from_millis(self.tick_interval_ms)
	}

	pub fn proof_timeout(&self) -> Duration {
		Duration::from_millis(self.proof_timeout_ms)
	}

	pub fn quote_timeout(&self) -> Duration {
		Duration::from_millis(self.quote_timeout_ms)
	}

	/// Time-to-live for archived entries, `None` when they never lapse.
	pub fn archive_ttl(&self) -> Option<Duration> {
		(self.archive_ttl_ms > 0).then(|| Duration::from_millis(self.archive_ttl_ms))
	}
}

/// Selection of a pluggable backend and its free-form settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
	/// Name of the implementation (e.g., "memory", "rpc")
	#[serde(alias = "backend", alias = "provider")]
	pub implementation: String,
	/// Implementation-specific settings, validated by its schema
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			implementation: "memory".to_string(),
			config: empty_table(),
		}
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
	pub host: String,
	pub port: u16,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 3000,
		}
	}
}
