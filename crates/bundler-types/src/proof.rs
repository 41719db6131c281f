//! Fair-ordering proof types.
//!
//! A proof binds an intent to an immutable, timestamped commitment so that a
//! bundle's claimed order can be audited after the fact.

use serde::{Deserialize, Serialize};

use crate::{u256_serde, Address, Bytes, TimestampMs, B256, U256};

/// Opaque cryptographic payload produced by a proof backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBlob {
	/// Proof system identifier (e.g., "groth16").
	pub protocol: String,
	/// Version of the circuit the proof was produced for.
	pub circuit_version: u32,
	/// Serialized proof.
	pub payload: Bytes,
	/// Public signals exposed by the circuit, as decimal or hex strings.
	pub public_signals: Vec<String>,
}

/// Evidence that an intent's position in a batch was not chosen adversarially.
///
/// Immutable once generated. A new swap always gets a new proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairOrderingProof {
	/// Binding value derived from the intent contents.
	pub commitment: B256,
	/// Single-use token preventing replay across intents.
	pub nullifier: B256,
	/// Claimed creation instant.
	pub timestamp: TimestampMs,
	pub proof: ProofBlob,
	/// Result of local structural validation at generation time.
	pub is_valid: bool,
}

/// One proof attesting to the fairness of a whole ordered set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateProof {
	/// Commitment over the member commitments, in bundle order.
	pub root: B256,
	/// Commitment over the member nullifiers, in bundle order.
	pub nullifier_root: B256,
	pub member_count: usize,
	pub first_timestamp: TimestampMs,
	pub last_timestamp: TimestampMs,
	pub proof: ProofBlob,
	pub is_valid: bool,
}

/// Inputs a proof is generated over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofInput {
	pub user: Address,
	pub chain_id: u64,
	pub from_token: Address,
	pub to_token: Address,
	#[serde(with = "u256_serde")]
	pub from_amount: U256,
	/// Claimed creation instant of the intent.
	pub timestamp: TimestampMs,
}
