//! Chain submission types.
//!
//! This module defines the atomic operation bundle handed to the entry point
//! and the confirmation reported back once it lands on chain.

use serde::{Deserialize, Serialize};

use crate::{u256_serde, Address, BundleId, Bytes, IntentId, B256, U256};

/// Blockchain transaction hash.
pub type TransactionHash = B256;

/// One member swap inside an atomic bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOperation {
	/// Intent this operation executes.
	pub intent_id: IntentId,
	pub to: Address,
	pub data: Bytes,
	#[serde(with = "u256_serde")]
	pub value: U256,
	pub gas: u64,
}

/// Ordered operations submitted as one atomic on-chain call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBundle {
	pub bundle_id: BundleId,
	pub chain_id: u64,
	pub operations: Vec<BundleOperation>,
}

impl OperationBundle {
	pub fn total_gas(&self) -> u64 {
		self.operations.iter().map(|op| op.gas).sum()
	}
}

/// Outcome of a submitted bundle once it has been mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
	pub tx_hash: TransactionHash,
	/// Whether the atomic call executed successfully.
	pub success: bool,
	pub block_number: Option<u64>,
	pub gas_used: Option<u64>,
}
