use serde::{Deserialize, Serialize};

use crate::{BundleId, IntentId, TransactionHash};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BundlerEvent {
	Intent(IntentEvent),
	Bundle(BundleEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntentEvent {
	Created {
		intent_id: IntentId,
	},
	Admitted {
		intent_id: IntentId,
	},
	Failed {
		intent_id: IntentId,
		reason: String,
	},
	Executed {
		intent_id: IntentId,
		bundle_id: BundleId,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BundleEvent {
	Closed {
		bundle_id: BundleId,
		members: Vec<IntentId>,
	},
	Submitted {
		bundle_id: BundleId,
		tx_hash: TransactionHash,
	},
	Confirmed {
		bundle_id: BundleId,
		tx_hash: TransactionHash,
		block_number: Option<u64>,
	},
	Failed {
		bundle_id: BundleId,
		reason: String,
	},
}

impl BundlerEvent {
	/// Intent the event concerns, if it concerns a single intent.
	pub fn intent_id(&self) -> Option<&str> {
		match self {
			Self::Intent(IntentEvent::Created { intent_id })
			| Self::Intent(IntentEvent::Admitted { intent_id })
			| Self::Intent(IntentEvent::Failed { intent_id, .. })
			| Self::Intent(IntentEvent::Executed { intent_id, .. }) => Some(intent_id),
			Self::Bundle(_) => None,
		}
	}

	/// Bundle the event concerns, if any.
	pub fn bundle_id(&self) -> Option<&str> {
		match self {
			Self::Intent(IntentEvent::Executed { bundle_id, .. }) => Some(bundle_id),
			Self::Intent(_) => None,
			Self::Bundle(BundleEvent::Closed { bundle_id, .. })
			| Self::Bundle(BundleEvent::Submitted { bundle_id, .. })
			| Self::Bundle(BundleEvent::Confirmed { bundle_id, .. })
			| Self::Bundle(BundleEvent::Failed { bundle_id, .. }) => Some(bundle_id),
		}
	}
}
