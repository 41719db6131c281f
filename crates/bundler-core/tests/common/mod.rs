//! Shared harness for engine scenarios: scripted collaborators and an engine
//! driven by a manual clock.

#![allow(dead_code)]

use async_trait::async_trait;
use bundler_config::{ApiConfig, BackendConfig, BundlerConfig, BundlerSettings};
use bundler_core::{BundlerBuilder, BundlerEngine};
use bundler_delivery::{DeliveryError, DeliveryInterface};
use bundler_proof::implementations::commitment::CommitmentProver;
use bundler_proof::{ProofError, ProofInterface};
use bundler_quote::{QuoteError, QuoteInterface};
use bundler_storage::implementations::memory::create_storage;
use bundler_types::{
	Address, AggregateProof, Bytes, ConfigSchema, Confirmation, CreateIntentRequest, EmptySchema,
	FairOrderingProof, ManualClock, OperationBundle, ProofInput, Quote, QuoteRequest,
	SwapTransaction, TransactionHash, B256, U256,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const START_MS: u64 = 1_700_000_000_000;
pub const CHAIN_ID: u64 = 1;

/// Commitment prover that refuses to prove the configured amounts.
pub struct ScriptedProver {
	inner: CommitmentProver,
	failing_amounts: HashSet<U256>,
}

#[async_trait]
impl ProofInterface for ScriptedProver {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EmptySchema)
	}

	fn expected_public_signals(&self) -> usize {
		self.inner.expected_public_signals()
	}

	async fn prove_intent(&self, input: &ProofInput) -> Result<FairOrderingProof, ProofError> {
		if self.failing_amounts.contains(&input.from_amount) {
			return Err(ProofError::Generation("witness out of range".into()));
		}
		self.inner.prove_intent(input).await
	}

	async fn prove_batch(&self, proofs: &[FairOrderingProof]) -> Result<AggregateProof, ProofError> {
		self.inner.prove_batch(proofs).await
	}

	fn verify_payload(&self, proof: &FairOrderingProof) -> bool {
		self.inner.verify_payload(proof)
	}
}

/// Quote source that prices every swap at two-for-one and refuses to build
/// transactions for the configured amounts.
pub struct ScriptedQuotes {
	failing_amounts: HashSet<U256>,
}

#[async_trait]
impl QuoteInterface for ScriptedQuotes {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EmptySchema)
	}

	async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
		Ok(Quote {
			to_amount: request.amount.saturating_mul(U256::from(2u64)),
			estimated_gas: 120_000,
			tx_data: None,
		})
	}

	async fn get_swap_transaction(
		&self,
		request: &QuoteRequest,
	) -> Result<SwapTransaction, QuoteError> {
		if self.failing_amounts.contains(&request.amount) {
			return Err(QuoteError::Unavailable("no route".into()));
		}
		Ok(SwapTransaction {
			to: Address::repeat_byte(0xaa),
			data: Bytes::from(request.amount.to_be_bytes_vec()),
			value: U256::ZERO,
			gas: 150_000,
			gas_price: U256::from(1u64),
		})
	}
}

/// Delivery backend that records what it was asked to submit.
pub struct RecordingDelivery {
	submitted: Arc<Mutex<Vec<OperationBundle>>>,
	revert: bool,
}

#[async_trait]
impl DeliveryInterface for RecordingDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EmptySchema)
	}

	async fn submit_bundle(
		&self,
		bundle: &OperationBundle,
	) -> Result<TransactionHash, DeliveryError> {
		let mut submitted = self.submitted.lock().unwrap();
		submitted.push(bundle.clone());
		Ok(B256::repeat_byte(submitted.len() as u8))
	}

	async fn wait_for_confirmation(
		&self,
		tx_hash: &TransactionHash,
	) -> Result<Confirmation, DeliveryError> {
		Ok(Confirmation {
			tx_hash: *tx_hash,
			success: !self.revert,
			block_number: Some(42),
			gas_used: Some(21_000),
		})
	}
}

pub struct Harness {
	pub engine: Arc<BundlerEngine>,
	pub clock: Arc<ManualClock>,
	pub submitted: Arc<Mutex<Vec<OperationBundle>>>,
}

pub struct HarnessOptions {
	pub max_bundle_size: usize,
	pub bundle_timeout_ms: u64,
	pub intent_deadline_ms: u64,
	pub archive_ttl_ms: u64,
	/// Amounts whose swap transaction cannot be built.
	pub failing_amounts: Vec<u64>,
	/// Amounts whose fair-ordering proof cannot be generated.
	pub unprovable_amounts: Vec<u64>,
	pub revert: bool,
}

impl Default for HarnessOptions {
	fn default() -> Self {
		Self {
			max_bundle_size: 5,
			bundle_timeout_ms: 10_000,
			intent_deadline_ms: 600_000,
			archive_ttl_ms: 0,
			failing_amounts: vec![],
			unprovable_amounts: vec![],
			revert: false,
		}
	}
}

fn amounts(values: &[u64]) -> HashSet<U256> {
	values.iter().map(|amount| U256::from(*amount)).collect()
}

fn backend(name: &str) -> BackendConfig {
	BackendConfig {
		implementation: name.to_string(),
		config: toml::Value::Table(toml::map::Map::new()),
	}
}

pub fn harness(options: HarnessOptions) -> Harness {
	let config = BundlerConfig {
		bundler: BundlerSettings {
			chain_id: CHAIN_ID,
			bundle_max_size: options.max_bundle_size,
			bundle_timeout_ms: options.bundle_timeout_ms,
			submission_timeout_ms: 5_000,
			intent_deadline_ms: options.intent_deadline_ms,
			retention_ms: 60_000,
			archive_ttl_ms: options.archive_ttl_ms,
			..Default::default()
		},
		storage: backend("memory"),
		proof: backend("scripted"),
		quote: backend("scripted"),
		delivery: backend("recording"),
		api: ApiConfig::default(),
	};

	let clock = Arc::new(ManualClock::new(START_MS));
	let submitted = Arc::new(Mutex::new(Vec::new()));
	let failing = amounts(&options.failing_amounts);
	let unprovable = amounts(&options.unprovable_amounts);
	let recorder = submitted.clone();
	let revert = options.revert;

	let engine = BundlerBuilder::new(config)
		.with_clock(clock.clone())
		.with_storage_factory("memory", create_storage)
		.with_proof_factory("scripted", move |_| {
			Box::new(ScriptedProver {
				inner: CommitmentProver::new(1, Duration::ZERO),
				failing_amounts: unprovable.clone(),
			})
		})
		.with_quote_factory("scripted", move |_| {
			Box::new(ScriptedQuotes {
				failing_amounts: failing.clone(),
			})
		})
		.with_delivery_factory("recording", move |_| {
			Box::new(RecordingDelivery {
				submitted: recorder.clone(),
				revert,
			})
		})
		.build()
		.expect("engine builds");

	Harness {
		engine: Arc::new(engine),
		clock,
		submitted,
	}
}

/// A well-formed request from a user derived from `seed`.
pub fn request(seed: u8, amount: u64) -> CreateIntentRequest {
	CreateIntentRequest {
		user: Address::repeat_byte(seed),
		from_token: Address::repeat_byte(0x11),
		to_token: Address::repeat_byte(0x22),
		amount: U256::from(amount),
		slippage_bps: 50,
		chain_id: None,
		min_to_amount: None,
		mev_protection: true,
	}
}
