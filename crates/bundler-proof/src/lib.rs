//! Fair-ordering proof module for the bundler.
//!
//! Every admitted intent carries a proof binding it to a timestamped
//! commitment, and every closed bundle carries one aggregate proof over its
//! members. The cryptography lives behind [`ProofInterface`] so the proof
//! system can be swapped without touching the scheduler. [`ProofService`] adds
//! the backend-independent checks: freshness, ordering, scoring and nullifier
//! reuse.

use async_trait::async_trait;
use bundler_types::{
	AggregateProof, Address, Clock, ConfigSchema, FairOrderingProof, ProofInput, TimestampMs, B256,
	U256,
};
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Re-export implementations
pub mod implementations {
	pub mod commitment;
}

/// Proofs younger than this earn the full freshness bonus.
const FRESH_MS: u64 = 60_000;
/// Proofs younger than this earn the partial freshness bonus.
const RECENT_MS: u64 = 300_000;

/// Errors that can occur while generating or checking proofs.
#[derive(Debug, Error)]
pub enum ProofError {
	/// The backend could not produce a proof for an intent.
	#[error("Proof generation failed: {0}")]
	Generation(String),
	/// The batch proof could not be produced.
	#[error("Batch proof failed: {0}")]
	Batch(String),
	/// The proof did not pass verification.
	#[error("Proof verification failed: {0}")]
	Verification(String),
	/// The proof's nullifier has already been consumed by another intent.
	#[error("Nullifier already used: {0}")]
	NullifierReused(B256),
	/// Proof generation exceeded the configured time bound.
	#[error("Proof generation timed out after {0:?}")]
	Timeout(Duration),
}

/// Trait defining the interface for proof system backends.
///
/// Implementations own the cryptographic details. They never see the registry
/// or the clock; the service passes them everything they need.
#[async_trait]
pub trait ProofInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Number of public signals a well-formed proof from this backend exposes.
	fn expected_public_signals(&self) -> usize;

	/// Generates a proof binding the given inputs to their timestamp.
	async fn prove_intent(&self, input: &ProofInput) -> Result<FairOrderingProof, ProofError>;

	/// Generates one proof over an ordered, non-empty set of member proofs.
	async fn prove_batch(&self, proofs: &[FairOrderingProof]) -> Result<AggregateProof, ProofError>;

	/// Checks the backend-specific payload of a proof. Must not mutate state.
	fn verify_payload(&self, proof: &FairOrderingProof) -> bool;
}

/// Service that wraps a proof backend with the time-dependent checks.
pub struct ProofService {
	backend: Box<dyn ProofInterface>,
	clock: Arc<dyn Clock>,
	/// Maximum proof age accepted by verification.
	freshness_ms: u64,
	/// Upper bound on a single proof generation.
	timeout: Duration,
	/// Nullifiers already consumed by admitted intents.
	nullifiers: DashSet<B256>,
}

impl ProofService {
	pub fn new(
		backend: Box<dyn ProofInterface>,
		clock: Arc<dyn Clock>,
		freshness_ms: u64,
		timeout: Duration,
	) -> Self {
		Self {
			backend,
			clock,
			freshness_ms,
			timeout,
			nullifiers: DashSet::new(),
		}
	}

	pub fn expected_public_signals(&self) -> usize {
		self.backend.expected_public_signals()
	}

	/// Generates a fair-ordering proof for an intent.
	///
	/// Rejects inputs with a missing field before reaching the backend. The
	/// backend call is bounded by the configured timeout.
	pub async fn prove_intent(&self, input: &ProofInput) -> Result<FairOrderingProof, ProofError> {
		if let Some(field) = missing_field(input) {
			return Err(ProofError::Generation(format!("missing {}", field)));
		}

		match tokio::time::timeout(self.timeout, self.backend.prove_intent(input)).await {
			Ok(result) => result,
			Err(_) => Err(ProofError::Timeout(self.timeout)),
		}
	}

	/// Checks a single proof.
	///
	/// A proof is valid when it was valid at generation, its payload checks
	/// out, it exposes the expected public signals and its timestamp lies
	/// within the freshness window. Timestamps in the future are invalid.
	/// Calling this twice on the same proof gives the same answer as long as
	/// the clock has not moved.
	pub fn verify_intent_proof(&self, proof: &FairOrderingProof) -> bool {
		if !proof.is_valid {
			return false;
		}
		if proof.proof.public_signals.len() != self.backend.expected_public_signals() {
			debug!(
				"Proof has {} public signals, expected {}",
				proof.proof.public_signals.len(),
				self.backend.expected_public_signals()
			);
			return false;
		}
		if !self.is_fresh(proof.timestamp) {
			return false;
		}

		self.backend.verify_payload(proof)
	}

	/// Generates the aggregate proof for a bundle. Member order is preserved.
	pub async fn prove_batch(
		&self,
		proofs: &[FairOrderingProof],
	) -> Result<AggregateProof, ProofError> {
		if proofs.is_empty() {
			return Err(ProofError::Batch("empty batch".into()));
		}

		match tokio::time::timeout(self.timeout, self.backend.prove_batch(proofs)).await {
			Ok(result) => result,
			Err(_) => Err(ProofError::Timeout(self.timeout)),
		}
	}

	/// Audits a claimed bundle order.
	///
	/// Valid iff the batch is non-empty, every proof verifies on its own, no
	/// nullifier appears twice and the claimed order is already sorted by
	/// timestamp.
	pub fn verify_batch_ordering(&self, proofs: &[FairOrderingProof]) -> bool {
		if proofs.is_empty() {
			return false;
		}
		if !proofs.iter().all(|proof| self.verify_intent_proof(proof)) {
			return false;
		}

		let mut seen = std::collections::HashSet::with_capacity(proofs.len());
		if !proofs.iter().all(|proof| seen.insert(proof.nullifier)) {
			warn!("Batch contains a repeated nullifier");
			return false;
		}

		proofs
			.windows(2)
			.all(|pair| pair[0].timestamp <= pair[1].timestamp)
	}

	/// Scores a proof from 0 to 100.
	///
	/// 50 points for a valid proof, up to 30 for freshness (30 under a minute,
	/// 20 under five minutes, 10 otherwise) and 20 for exposing the expected
	/// number of public signals.
	pub fn score_proof(&self, proof: &FairOrderingProof) -> u8 {
		let mut score: u32 = 0;

		if self.verify_intent_proof(proof) {
			score += 50;
		}

		let age = self.clock.now_ms().saturating_sub(proof.timestamp);
		score += if age < FRESH_MS {
			30
		} else if age < RECENT_MS {
			20
		} else {
			10
		};

		if proof.proof.public_signals.len() >= self.backend.expected_public_signals() {
			score += 20;
		}

		score.min(100) as u8
	}

	/// Records a proof's nullifier as consumed.
	///
	/// Fails if another intent already consumed it. Admission calls this once
	/// per intent; verification never does.
	pub fn register_nullifier(&self, proof: &FairOrderingProof) -> Result<(), ProofError> {
		if self.nullifiers.insert(proof.nullifier) {
			Ok(())
		} else {
			Err(ProofError::NullifierReused(proof.nullifier))
		}
	}

	fn is_fresh(&self, timestamp: TimestampMs) -> bool {
		let now = self.clock.now_ms();
		timestamp <= now && now - timestamp <= self.freshness_ms
	}
}

fn missing_field(input: &ProofInput) -> Option<&'static str> {
	if input.user == Address::ZERO {
		Some("user")
	} else if input.chain_id == 0 {
		Some("chain_id")
	} else if input.from_token == Address::ZERO {
		Some("from_token")
	} else if input.to_token == Address::ZERO {
		Some("to_token")
	} else if input.from_amount == U256::ZERO {
		Some("from_amount")
	} else if input.timestamp == 0 {
		Some("timestamp")
	} else {
		None
	}
}
