//! Quote-source collaborator types.

use serde::{Deserialize, Serialize};

use crate::{u256_serde, Address, Bytes, U256};

/// Parameters of a quote or swap-transaction request.
///
/// Identical requests within a short validity window are expected to yield
/// identical answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
	pub chain_id: u64,
	pub from_token: Address,
	pub to_token: Address,
	#[serde(with = "u256_serde")]
	pub amount: U256,
	pub slippage_bps: u16,
	/// Account the swap executes from.
	pub from: Address,
}

/// Price quote for a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
	#[serde(with = "u256_serde")]
	pub to_amount: U256,
	pub estimated_gas: u64,
	pub tx_data: Option<Bytes>,
}

/// Transaction data executing a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTransaction {
	pub to: Address,
	pub data: Bytes,
	#[serde(with = "u256_serde")]
	pub value: U256,
	pub gas: u64,
	#[serde(with = "u256_serde")]
	pub gas_price: U256,
}
