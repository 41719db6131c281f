//! Hash-commitment proof backend.
//!
//! Stands in for a zero-knowledge circuit. The commitment is keccak256 over
//! the intent inputs and a fresh random nonce, so two proofs over identical
//! inputs never collide. The payload binds commitment and nullifier together
//! and the public signals expose `[commitment, nullifier, timestamp]`.
//! Anyone holding the proof can recheck it; nobody learns the nonce.

use crate::{ProofError, ProofInterface};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use bundler_types::{
	AggregateProof, Bytes, ConfigSchema, FairOrderingProof, Field, FieldType, ProofBlob,
	ProofInput, Schema, ValidationError, B256,
};
use std::time::Duration;
use tracing::debug;

const PROTOCOL: &str = "keccak-commitment";
const PUBLIC_SIGNALS: usize = 3;

/// Commitment prover.
pub struct CommitmentProver {
	circuit_version: u32,
	/// Artificial latency added to every proof, for exercising timeouts.
	proving_delay: Duration,
}

impl CommitmentProver {
	pub fn new(circuit_version: u32, proving_delay: Duration) -> Self {
		Self {
			circuit_version,
			proving_delay,
		}
	}

	async fn simulate_latency(&self) {
		if !self.proving_delay.is_zero() {
			tokio::time::sleep(self.proving_delay).await;
		}
	}
}

fn random_nonce() -> B256 {
	let mut seed = [0u8; 32];
	seed[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
	seed[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
	keccak256(seed)
}

fn commit(input: &ProofInput, nonce: &B256) -> B256 {
	let mut preimage = Vec::with_capacity(20 * 3 + 8 * 2 + 32 * 2);
	preimage.extend_from_slice(input.user.as_slice());
	preimage.extend_from_slice(&input.chain_id.to_be_bytes());
	preimage.extend_from_slice(input.from_token.as_slice());
	preimage.extend_from_slice(input.to_token.as_slice());
	preimage.extend_from_slice(&input.from_amount.to_be_bytes::<32>());
	preimage.extend_from_slice(&input.timestamp.to_be_bytes());
	preimage.extend_from_slice(nonce.as_slice());
	keccak256(preimage)
}

fn bind(a: &B256, b: &B256) -> B256 {
	let mut preimage = [0u8; 64];
	preimage[..32].copy_from_slice(a.as_slice());
	preimage[32..].copy_from_slice(b.as_slice());
	keccak256(preimage)
}

fn fold<'a>(values: impl Iterator<Item = &'a B256>) -> B256 {
	let mut preimage = Vec::new();
	for value in values {
		preimage.extend_from_slice(value.as_slice());
	}
	keccak256(preimage)
}

/// Configuration schema for CommitmentProver.
pub struct CommitmentProverSchema;

impl ConfigSchema for CommitmentProverSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![],
			// Optional fields
			vec![
				Field::new(
					"circuit_version",
					FieldType::Integer {
						min: Some(1),
						max: Some(u32::MAX as i64),
					},
				),
				Field::new(
					"proving_delay_ms",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl ProofInterface for CommitmentProver {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CommitmentProverSchema)
	}

	fn expected_public_signals(&self) -> usize {
		PUBLIC_SIGNALS
	}

	async fn prove_intent(&self, input: &ProofInput) -> Result<FairOrderingProof, ProofError> {
		self.simulate_latency().await;

		let nonce = random_nonce();
		let commitment = commit(input, &nonce);
		let nullifier = bind(&nonce, &commitment);
		let payload = bind(&commitment, &nullifier);

		debug!("Generated commitment {} at {}", commitment, input.timestamp);

		let mut proof = FairOrderingProof {
			commitment,
			nullifier,
			timestamp: input.timestamp,
			proof: ProofBlob {
				protocol: PROTOCOL.to_string(),
				circuit_version: self.circuit_version,
				payload: Bytes::copy_from_slice(payload.as_slice()),
				public_signals: vec![
					commitment.to_string(),
					nullifier.to_string(),
					input.timestamp.to_string(),
				],
			},
			is_valid: false,
		};
		proof.is_valid = self.verify_payload(&proof);

		if !proof.is_valid {
			return Err(ProofError::Generation(
				"generated proof failed self-check".into(),
			));
		}

		Ok(proof)
	}

	async fn prove_batch(&self, proofs: &[FairOrderingProof]) -> Result<AggregateProof, ProofError> {
		let (first, last) = match (proofs.first(), proofs.last()) {
			(Some(first), Some(last)) => (first.timestamp, last.timestamp),
			_ => return Err(ProofError::Batch("empty batch".into())),
		};

		self.simulate_latency().await;

		let root = fold(proofs.iter().map(|p| &p.commitment));
		let nullifier_root = fold(proofs.iter().map(|p| &p.nullifier));
		let payload = bind(&root, &nullifier_root);
		let is_valid = proofs.iter().all(|p| self.verify_payload(p));

		Ok(AggregateProof {
			root,
			nullifier_root,
			member_count: proofs.len(),
			first_timestamp: first,
			last_timestamp: last,
			proof: ProofBlob {
				protocol: PROTOCOL.to_string(),
				circuit_version: self.circuit_version,
				payload: Bytes::copy_from_slice(payload.as_slice()),
				public_signals: vec![
					root.to_string(),
					nullifier_root.to_string(),
					proofs.len().to_string(),
					first.to_string(),
					last.to_string(),
				],
			},
			is_valid,
		})
	}

	fn verify_payload(&self, proof: &FairOrderingProof) -> bool {
		if proof.proof.protocol != PROTOCOL {
			return false;
		}

		let expected_signals = [
			proof.commitment.to_string(),
			proof.nullifier.to_string(),
			proof.timestamp.to_string(),
		];
		if proof.proof.public_signals.as_slice() != expected_signals.as_slice() {
			return false;
		}

		proof.proof.payload.as_ref() == bind(&proof.commitment, &proof.nullifier).as_slice()
	}
}

/// Factory function to create the commitment prover from configuration.
///
/// Configuration parameters:
/// - `circuit_version`: Version tag stamped into every proof (default: 1)
/// - `proving_delay_ms`: Artificial latency per proof (default: 0)
pub fn create_proof_backend(config: &toml::Value) -> Box<dyn ProofInterface> {
	let circuit_version = config
		.get("circuit_version")
		.and_then(|v| v.as_integer())
		.and_then(|v| u32::try_from(v).ok())
		.unwrap_or(1);

	let proving_delay_ms = config
		.get("proving_delay_ms")
		.and_then(|v| v.as_integer())
		.and_then(|v| u64::try_from(v).ok())
		.unwrap_or(0);

	Box::new(CommitmentProver::new(
		circuit_version,
		Duration::from_millis(proving_delay_ms),
	))
}
