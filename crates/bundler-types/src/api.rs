//! API types for the bundler HTTP API.
//!
//! This module defines the request and response bodies exchanged with
//! external callers (UI, CLI, monitoring).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{u256_serde, Address, BundleId, U256};

/// Request to create a protected swap intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
	/// User's wallet address
	pub user: Address,
	/// Token being sold
	pub from_token: Address,
	/// Token being bought
	pub to_token: Address,
	/// Amount to sell as a decimal integer string
	#[serde(with = "u256_serde")]
	pub amount: U256,
	/// Slippage tolerance in basis points
	pub slippage_bps: u16,
	/// Chain to execute on; defaults to the bundler's chain
	pub chain_id: Option<u64>,
	/// Explicit slippage floor; derived from a quote when absent
	#[serde(default, with = "option_u256_serde")]
	pub min_to_amount: Option<U256>,
	/// Whether MEV protection is requested
	#[serde(default = "default_mev_protection")]
	pub mev_protection: bool,
}

fn default_mev_protection() -> bool {
	true
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Aggregate counters over the registry and bundle store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerStats {
	/// Intent counts keyed by status
	pub intents: HashMap<String, usize>,
	/// Bundle counts keyed by status
	pub bundles: HashMap<String, usize>,
	/// Sum of advisory savings estimates over live intents
	#[serde(with = "u256_serde")]
	pub estimated_savings: U256,
}

/// Advisory protection score of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionReport {
	pub bundle_id: BundleId,
	/// Average proof score over the members, 0-100
	pub score: u8,
	/// Whether the ordering audit passed when the bundle closed
	pub ordering_verified: bool,
}

/// Serde module for optional U256 values as decimal strings.
pub mod option_u256_serde {
	use alloy_primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.map(|v| v.to_string()).serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<String>::deserialize(deserializer)?
			.map(|s| U256::from_str_radix(&s, 10).map_err(D::Error::custom))
			.transpose()
	}
}
