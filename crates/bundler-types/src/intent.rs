//! Swap intent types.
//!
//! An intent is one user's request to exchange `from_token` for `to_token`
//! under fair-ordering protection. It is created pending, claimed by exactly
//! one bundle, and resolves to executed or failed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{u256_serde, Address, BundleId, FairOrderingProof, IntentId, TimestampMs, U256};

/// Lifecycle status of a swap intent.
///
/// Permitted transitions are `pending → bundled → executed`,
/// `pending → failed` and `bundled → failed`. Executed and failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
	Pending,
	Bundled,
	Executed,
	Failed,
}

impl IntentStatus {
	/// Returns true if no transition leaves this status.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Executed | Self::Failed)
	}

	/// Returns true if the state machine allows moving from `self` to `next`.
	pub fn can_transition_to(self, next: IntentStatus) -> bool {
		use IntentStatus::*;

		matches!(
			(self, next),
			(Pending, Bundled) | (Bundled, Executed) | (Pending, Failed) | (Bundled, Failed)
		)
	}
}

impl fmt::Display for IntentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Pending => write!(f, "pending"),
			Self::Bundled => write!(f, "bundled"),
			Self::Executed => write!(f, "executed"),
			Self::Failed => write!(f, "failed"),
		}
	}
}

/// A user's request to perform a protected swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapIntent {
	/// Globally unique identifier, assigned at creation.
	pub id: IntentId,
	/// Address of the user requesting the swap.
	pub user: Address,
	/// Chain the swap executes on.
	pub chain_id: u64,
	/// Token being sold.
	pub from_token: Address,
	/// Token being bought.
	pub to_token: Address,
	/// Amount of `from_token` to sell.
	#[serde(with = "u256_serde")]
	pub from_amount: U256,
	/// Slippage floor on the amount of `to_token` received.
	#[serde(with = "u256_serde")]
	pub min_to_amount: U256,
	/// Absolute expiry instant.
	pub deadline: TimestampMs,
	/// Slippage tolerance in basis points.
	pub slippage_bps: u16,
	/// Whether the user asked for MEV protection.
	pub mev_protection_requested: bool,
	/// Fair-ordering proof, attached once computed. Immutable afterwards.
	pub fair_ordering_proof: Option<FairOrderingProof>,
	/// Current lifecycle status.
	pub status: IntentStatus,
	/// Logical creation timestamp used for ordering.
	pub created_at: TimestampMs,
	/// Timestamp of the last status change.
	pub updated_at: TimestampMs,
	/// Registry insertion sequence.
	pub sequence: u64,
	/// Bundle this intent was claimed by, if any.
	pub bundle_id: Option<BundleId>,
	/// Why the intent failed, when it did.
	pub failure_reason: Option<String>,
}

impl SwapIntent {
	/// An intent is admitted once its fair-ordering proof is attached.
	pub fn is_admitted(&self) -> bool {
		self.fair_ordering_proof.is_some()
	}

	/// Key used to order intents inside a bundle: oldest first, ties by id.
	pub fn ordering_key(&self) -> (TimestampMs, &str) {
		(self.created_at, self.id.as_str())
	}

	pub fn is_expired(&self, now_ms: TimestampMs) -> bool {
		now_ms >= self.deadline
	}
}

/// Well-formed input for creating an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
	pub user: Address,
	pub chain_id: u64,
	pub from_token: Address,
	pub to_token: Address,
	pub from_amount: U256,
	pub min_to_amount: U256,
	pub slippage_bps: u16,
	pub mev_protection_requested: bool,
}
