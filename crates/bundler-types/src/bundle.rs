//! Bundle types.
//!
//! A bundle is a closed, ordered batch of intents submitted as one atomic
//! operation set. Its membership is fixed when it closes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AggregateProof, BundleId, IntentId, TimestampMs, TransactionHash};

/// Lifecycle status of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
	Pending,
	Submitted,
	Confirmed,
	Failed,
}

impl BundleStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Confirmed | Self::Failed)
	}

	/// Returns true if the state machine allows moving from `self` to `next`.
	pub fn can_transition_to(self, next: BundleStatus) -> bool {
		use BundleStatus::*;

		matches!(
			(self, next),
			(Pending, Submitted) | (Pending, Failed) | (Submitted, Confirmed) | (Submitted, Failed)
		)
	}
}

impl fmt::Display for BundleStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Pending => write!(f, "pending"),
			Self::Submitted => write!(f, "submitted"),
			Self::Confirmed => write!(f, "confirmed"),
			Self::Failed => write!(f, "failed"),
		}
	}
}

/// An ordered, closed batch of intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
	/// Unique identifier for this bundle.
	pub id: BundleId,
	/// Chain the bundle is submitted to.
	pub chain_id: u64,
	/// Member intents in execution order, fixed at closing time.
	pub members: Vec<IntentId>,
	/// Members dropped during assembly (their intents failed individually).
	pub excluded: Vec<IntentId>,
	pub status: BundleStatus,
	pub created_at: TimestampMs,
	pub updated_at: TimestampMs,
	/// Set only once the bundle has been submitted.
	pub tx_hash: Option<TransactionHash>,
	/// Block the bundle was included in, once confirmed.
	pub block_number: Option<u64>,
	/// Single proof attesting to the fairness of the ordered set.
	pub aggregate_proof: Option<AggregateProof>,
	/// Outcome of the ordering audit run when the bundle closed.
	pub ordering_verified: bool,
	pub failure_reason: Option<String>,
}

impl Bundle {
	/// Members that were not excluded during assembly, in bundle order.
	pub fn surviving_members(&self) -> impl Iterator<Item = &IntentId> {
		self.members
			.iter()
			.filter(move |id| !self.excluded.contains(id))
	}

	pub fn is_active(&self) -> bool {
		!self.status.is_terminal()
	}
}

/// Changes the submitter may apply alongside a bundle status transition.
///
/// Membership is deliberately absent: it cannot change after closing.
#[derive(Debug, Clone, Default)]
pub struct BundleUpdate {
	pub tx_hash: Option<TransactionHash>,
	pub block_number: Option<u64>,
	pub excluded: Vec<IntentId>,
	pub failure_reason: Option<String>,
}
