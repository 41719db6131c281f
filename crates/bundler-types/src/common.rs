//! Common types used throughout the bundler.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// Re-export commonly used ethereum types
pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Identifier of a swap intent.
pub type IntentId = String;

/// Identifier of a closed bundle.
pub type BundleId = String;

/// Timestamp in milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Source of the current time.
///
/// All timestamps, freshness checks and time-based close conditions read the
/// clock through this trait so that tests can drive time explicitly.
pub trait Clock: Send + Sync + fmt::Debug {
	/// Current time in milliseconds since the Unix epoch.
	fn now_ms(&self) -> TimestampMs;
}

/// Wall clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_ms(&self) -> TimestampMs {
		chrono::Utc::now().timestamp_millis().max(0) as u64
	}
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
	now: AtomicU64,
}

impl ManualClock {
	pub fn new(start_ms: TimestampMs) -> Self {
		Self {
			now: AtomicU64::new(start_ms),
		}
	}

	pub fn set(&self, now_ms: TimestampMs) {
		self.now.store(now_ms, Ordering::SeqCst);
	}

	pub fn advance(&self, delta_ms: u64) {
		self.now.fetch_add(delta_ms, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> TimestampMs {
		self.now.load(Ordering::SeqCst)
	}
}

/// Generates a globally unique, lexicographically ordered identifier.
///
/// The zero-padded sequence keeps identifiers sortable in creation order and
/// the random suffix keeps them unique across processes.
pub fn generate_id(prefix: &str, sequence: u64) -> String {
	let salt = uuid::Uuid::new_v4().simple().to_string();
	format!("{}-{:012}-{}", prefix, sequence, &salt[..8])
}

/// Basis points in a whole.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// `amount * bps / 10_000` without overflowing.
///
/// When the product does not fit, the division happens first, which only
/// loses the remainder below one basis point.
pub fn bps_of(amount: U256, bps: u64) -> U256 {
	let bps = U256::from(bps);
	let denominator = U256::from(BPS_DENOMINATOR);
	match amount.checked_mul(bps) {
		Some(product) => product / denominator,
		None => (amount / denominator).saturating_mul(bps),
	}
}

/// Serde module for U256 serialization/deserialization as decimal strings.
pub mod u256_serde {
	use alloy_primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.to_string().serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		U256::from_str_radix(&s, 10).map_err(D::Error::custom)
	}
}
