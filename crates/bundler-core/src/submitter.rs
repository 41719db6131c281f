//! Bundle submitter.
//!
//! Turns a closed bundle into one atomic operation bundle, submits it once,
//! and reconciles the registry with the outcome. Members whose swap
//! transaction cannot be built fail on their own and are left out of the
//! call; the rest of the bundle goes ahead.

use crate::event_bus::EventBus;
use crate::CoreError;
use bundler_delivery::{DeliveryError, DeliveryService};
use bundler_quote::QuoteService;
use bundler_registry::{BundleStore, IntentRegistry};
use bundler_types::{
	Bundle, BundleEvent, BundleOperation, BundleStatus, BundleUpdate, BundlerEvent, IntentEvent,
	IntentId, IntentStatus, OperationBundle, QuoteRequest, SwapIntent,
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Submits closed bundles and settles their members.
pub struct BundleSubmitter {
	registry: Arc<IntentRegistry>,
	bundles: Arc<BundleStore>,
	quotes: Arc<QuoteService>,
	delivery: Arc<DeliveryService>,
	event_bus: EventBus,
}

impl BundleSubmitter {
	pub fn new(
		registry: Arc<IntentRegistry>,
		bundles: Arc<BundleStore>,
		quotes: Arc<QuoteService>,
		delivery: Arc<DeliveryService>,
		event_bus: EventBus,
	) -> Self {
		Self {
			registry,
			bundles,
			quotes,
			delivery,
			event_bus,
		}
	}

	/// Submits a bundle and then waits for its confirmation.
	pub async fn process(&self, bundle: Bundle) -> Result<Bundle, CoreError> {
		let bundle = self.submit(bundle).await?;
		if bundle.status == BundleStatus::Submitted {
			self.confirm(bundle).await
		} else {
			Ok(bundle)
		}
	}

	/// Assembles and submits a pending bundle.
	///
	/// Returns the bundle as `submitted` on success, or `failed` when no
	/// member could be assembled or the submission itself failed. Never
	/// retries.
	#[instrument(skip_all, fields(bundle_id = %bundle.id))]
	pub async fn submit(&self, bundle: Bundle) -> Result<Bundle, CoreError> {
		let mut operations = Vec::with_capacity(bundle.members.len());
		let mut excluded = Vec::new();

		for (intent_id, result) in self.assemble(&bundle).await {
			match result {
				Ok(operation) => operations.push(operation),
				Err(reason) => {
					warn!(intent_id = %intent_id, "Excluding member: {}", reason);
					self.fail_member(&intent_id, reason);
					excluded.push(intent_id);
				}
			}
		}

		if operations.is_empty() {
			let reason = "no member could be assembled".to_string();
			return self.fail_bundle(&bundle, BundleStatus::Pending, excluded, reason);
		}

		let operation_bundle = OperationBundle {
			bundle_id: bundle.id.clone(),
			chain_id: bundle.chain_id,
			operations,
		};

		match self.delivery.submit(&operation_bundle).await {
			Ok(tx_hash) => {
				let submitted = self.bundles.transition(
					&bundle.id,
					&[BundleStatus::Pending],
					BundleStatus::Submitted,
					BundleUpdate {
						tx_hash: Some(tx_hash),
						excluded,
						..Default::default()
					},
				)?;
				self.event_bus
					.publish(BundlerEvent::Bundle(BundleEvent::Submitted {
						bundle_id: bundle.id.clone(),
						tx_hash,
					}));
				Ok(submitted)
			}
			Err(e) => {
				error!("Bundle submission failed: {}", e);
				self.fail_bundle(
					&bundle,
					BundleStatus::Pending,
					excluded,
					format!("submission failed: {}", e),
				)
			}
		}
	}

	/// Waits for a submitted bundle to land and settles its members.
	///
	/// Only a revert or an unreadable receipt fails the bundle. Anything else
	/// leaves it `submitted`: the call may still be mined, and pollers
	/// reconcile through status inspection.
	#[instrument(skip_all, fields(bundle_id = %bundle.id))]
	pub async fn confirm(&self, bundle: Bundle) -> Result<Bundle, CoreError> {
		let Some(tx_hash) = bundle.tx_hash else {
			return Err(CoreError::Lifecycle(format!(
				"bundle {} has no transaction hash",
				bundle.id
			)));
		};

		let confirmation = match self.delivery.confirm(&tx_hash).await {
			Ok(confirmation) => confirmation,
			Err(DeliveryError::Confirmation(e)) => {
				return self.fail_bundle(
					&bundle,
					BundleStatus::Submitted,
					vec![],
					format!("confirmation failed: {}", e),
				)
			}
			Err(e) => {
				warn!("Bundle outcome unknown, leaving it submitted: {}", e);
				return Ok(bundle);
			}
		};

		if !confirmation.success {
			return self.fail_bundle(
				&bundle,
				BundleStatus::Submitted,
				vec![],
				"bundle reverted on chain".to_string(),
			);
		}

		let confirmed = self.bundles.transition(
			&bundle.id,
			&[BundleStatus::Submitted],
			BundleStatus::Confirmed,
			BundleUpdate {
				block_number: confirmation.block_number,
				..Default::default()
			},
		)?;

		for intent_id in confirmed.surviving_members() {
			match self.registry.transition(
				intent_id,
				&[IntentStatus::Bundled],
				IntentStatus::Executed,
			) {
				Ok(_) => self
					.event_bus
					.publish(BundlerEvent::Intent(IntentEvent::Executed {
						intent_id: intent_id.clone(),
						bundle_id: confirmed.id.clone(),
					})),
				Err(e) => error!(intent_id = %intent_id, "Could not settle member: {}", e),
			}
		}

		info!(
			block_number = ?confirmation.block_number,
			"Bundle confirmed with {} members",
			confirmed.surviving_members().count()
		);
		self.event_bus
			.publish(BundlerEvent::Bundle(BundleEvent::Confirmed {
				bundle_id: confirmed.id.clone(),
				tx_hash,
				block_number: confirmation.block_number,
			}));

		Ok(confirmed)
	}

	/// Builds one operation per member, concurrently, in member order.
	async fn assemble(
		&self,
		bundle: &Bundle,
	) -> Vec<(IntentId, Result<BundleOperation, String>)> {
		let builds = bundle.members.iter().map(|intent_id| async move {
			let result = match self.registry.get(intent_id) {
				Some(intent) => self.build_operation(&intent).await,
				None => Err("intent not found".to_string()),
			};
			(intent_id.clone(), result)
		});

		join_all(builds).await
	}

	async fn build_operation(&self, intent: &SwapIntent) -> Result<BundleOperation, String> {
		let request = QuoteRequest {
			chain_id: intent.chain_id,
			from_token: intent.from_token,
			to_token: intent.to_token,
			amount: intent.from_amount,
			slippage_bps: intent.slippage_bps,
			from: intent.user,
		};

		let tx = self
			.quotes
			.get_swap_transaction(&request)
			.await
			.map_err(|e| e.to_string())?;

		Ok(BundleOperation {
			intent_id: intent.id.clone(),
			to: tx.to,
			data: tx.data,
			value: tx.value,
			gas: tx.gas,
		})
	}

	fn fail_member(&self, intent_id: &str, reason: String) {
		match self
			.registry
			.fail(intent_id, &[IntentStatus::Bundled], reason.clone())
		{
			Ok(_) => self
				.event_bus
				.publish(BundlerEvent::Intent(IntentEvent::Failed {
					intent_id: intent_id.to_string(),
					reason,
				})),
			Err(e) => error!(intent_id = %intent_id, "Could not fail member: {}", e),
		}
	}

	/// Fails the bundle and every member not already excluded.
	fn fail_bundle(
		&self,
		bundle: &Bundle,
		from: BundleStatus,
		excluded: Vec<IntentId>,
		reason: String,
	) -> Result<Bundle, CoreError> {
		let failed = self.bundles.transition(
			&bundle.id,
			&[from],
			BundleStatus::Failed,
			BundleUpdate {
				excluded,
				failure_reason: Some(reason.clone()),
				..Default::default()
			},
		)?;

		for intent_id in failed.surviving_members() {
			self.fail_member(intent_id, reason.clone());
		}

		warn!("Bundle failed: {}", reason);
		self.event_bus
			.publish(BundlerEvent::Bundle(BundleEvent::Failed {
				bundle_id: failed.id.clone(),
				reason,
			}));

		Ok(failed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use bundler_delivery::DeliveryInterface;
	use bundler_quote::{QuoteError, QuoteInterface};
	use bundler_types::{
		Address, Bytes, Clock, ConfigSchema, Confirmation, EmptySchema, IntentRequest, ManualClock,
		Quote, SwapTransaction, TransactionHash, B256, U256,
	};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	struct Quotes {
		available: bool,
	}

	#[async_trait]
	impl QuoteInterface for Quotes {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(EmptySchema)
		}

		async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
			Ok(Quote {
				to_amount: request.amount,
				estimated_gas: 0,
				tx_data: None,
			})
		}

		async fn get_swap_transaction(
			&self,
			_request: &QuoteRequest,
		) -> Result<SwapTransaction, QuoteError> {
			if !self.available {
				return Err(QuoteError::Unavailable("no route".into()));
			}
			Ok(SwapTransaction {
				to: Address::repeat_byte(0xaa),
				data: Bytes::new(),
				value: U256::ZERO,
				gas: 100_000,
				gas_price: U256::ZERO,
			})
		}
	}

	#[derive(Clone, Copy)]
	enum Outcome {
		Rejected,
		NeverMined,
		NodeError,
		BadReceipt,
		Mined,
	}

	struct Delivery {
		outcome: Outcome,
		submissions: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl DeliveryInterface for Delivery {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(EmptySchema)
		}

		async fn submit_bundle(
			&self,
			_bundle: &OperationBundle,
		) -> Result<TransactionHash, DeliveryError> {
			self.submissions.fetch_add(1, Ordering::SeqCst);
			match self.outcome {
				Outcome::Rejected => Err(DeliveryError::Submission("nonce too low".into())),
				_ => Ok(B256::repeat_byte(0x42)),
			}
		}

		async fn wait_for_confirmation(
			&self,
			tx_hash: &TransactionHash,
		) -> Result<Confirmation, DeliveryError> {
			match self.outcome {
				Outcome::NeverMined => std::future::pending().await,
				Outcome::NodeError => Err(DeliveryError::Submission(
					"eth_getTransactionReceipt failed (-32005): rate limited".into(),
				)),
				Outcome::BadReceipt => Err(DeliveryError::Confirmation("malformed receipt".into())),
				_ => Ok(Confirmation {
					tx_hash: *tx_hash,
					success: true,
					block_number: Some(7),
					gas_used: None,
				}),
			}
		}
	}

	struct Fixture {
		registry: Arc<IntentRegistry>,
		bundles: Arc<BundleStore>,
		submitter: BundleSubmitter,
		submissions: Arc<AtomicUsize>,
		clock: Arc<ManualClock>,
	}

	fn fixture(quotes_available: bool, outcome: Outcome) -> Fixture {
		let clock = Arc::new(ManualClock::new(1_700_000_000_000));
		let registry = Arc::new(IntentRegistry::new(clock.clone(), 600_000));
		let bundles = Arc::new(BundleStore::new(clock.clone()));
		let submissions = Arc::new(AtomicUsize::new(0));
		let submitter = BundleSubmitter::new(
			registry.clone(),
			bundles.clone(),
			Arc::new(QuoteService::new(
				Box::new(Quotes {
					available: quotes_available,
				}),
				Duration::from_secs(1),
			)),
			Arc::new(DeliveryService::new(
				Box::new(Delivery {
					outcome,
					submissions: submissions.clone(),
				}),
				Duration::from_secs(30),
			)),
			EventBus::new(64),
		);
		Fixture {
			registry,
			bundles,
			submitter,
			submissions,
			clock,
		}
	}

	/// Stores a pending bundle of `size` freshly claimed intents.
	fn closed_bundle(f: &Fixture, size: usize) -> Bundle {
		let id = f.bundles.next_id();
		let members = (0..size)
			.map(|i| {
				let intent = f
					.registry
					.create(IntentRequest {
						user: Address::repeat_byte(0x10 + i as u8),
						chain_id: 1,
						from_token: Address::repeat_byte(0x01),
						to_token: Address::repeat_byte(0x02),
						from_amount: U256::from(1_000u64),
						min_to_amount: U256::ZERO,
						slippage_bps: 50,
						mev_protection_requested: true,
					})
					.unwrap();
				f.registry.assign_to_bundle(&intent.id, &id).unwrap();
				intent.id
			})
			.collect();

		let bundle = Bundle {
			id,
			chain_id: 1,
			members,
			excluded: vec![],
			status: BundleStatus::Pending,
			created_at: f.clock.now_ms(),
			updated_at: f.clock.now_ms(),
			tx_hash: None,
			block_number: None,
			aggregate_proof: None,
			ordering_verified: true,
			failure_reason: None,
		};
		f.bundles.insert(bundle.clone()).unwrap();
		bundle
	}

	fn member_statuses(f: &Fixture, bundle: &Bundle) -> Vec<IntentStatus> {
		bundle
			.members
			.iter()
			.map(|id| f.registry.get(id).unwrap().status)
			.collect()
	}

	#[tokio::test]
	async fn test_rejected_submission_fails_bundle_and_members() {
		let f = fixture(true, Outcome::Rejected);
		let bundle = closed_bundle(&f, 3);

		let failed = f.submitter.process(bundle.clone()).await.unwrap();
		assert_eq!(failed.status, BundleStatus::Failed);
		assert!(failed
			.failure_reason
			.as_deref()
			.unwrap()
			.starts_with("submission failed"));
		assert!(failed.tx_hash.is_none());
		assert_eq!(f.submissions.load(Ordering::SeqCst), 1);

		for id in &bundle.members {
			let intent = f.registry.get(id).unwrap();
			assert_eq!(intent.status, IntentStatus::Failed);
			assert!(intent.failure_reason.unwrap().contains("nonce too low"));
		}
	}

	#[tokio::test]
	async fn test_no_assemblable_member_skips_submission() {
		let f = fixture(false, Outcome::Mined);
		let bundle = closed_bundle(&f, 2);

		let failed = f.submitter.process(bundle.clone()).await.unwrap();
		assert_eq!(failed.status, BundleStatus::Failed);
		assert_eq!(
			failed.failure_reason.as_deref(),
			Some("no member could be assembled")
		);
		assert_eq!(failed.excluded, bundle.members);
		assert_eq!(f.submissions.load(Ordering::SeqCst), 0);

		// Each member keeps its own quote failure.
		for id in &bundle.members {
			let intent = f.registry.get(id).unwrap();
			assert_eq!(intent.status, IntentStatus::Failed);
			assert!(intent.failure_reason.unwrap().contains("no route"));
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_unconfirmed_bundle_stays_submitted() {
		let f = fixture(true, Outcome::NeverMined);
		let bundle = closed_bundle(&f, 2);

		let outcome = f.submitter.process(bundle.clone()).await.unwrap();
		assert_eq!(outcome.status, BundleStatus::Submitted);
		assert_eq!(outcome.tx_hash, Some(B256::repeat_byte(0x42)));
		assert_eq!(
			f.bundles.get(&bundle.id).unwrap().status,
			BundleStatus::Submitted
		);
		assert_eq!(
			member_statuses(&f, &bundle),
			vec![IntentStatus::Bundled, IntentStatus::Bundled]
		);
	}

	#[tokio::test]
	async fn test_node_error_while_confirming_stays_submitted() {
		let f = fixture(true, Outcome::NodeError);
		let bundle = closed_bundle(&f, 2);

		let outcome = f.submitter.process(bundle.clone()).await.unwrap();
		assert_eq!(outcome.status, BundleStatus::Submitted);
		assert_eq!(
			member_statuses(&f, &bundle),
			vec![IntentStatus::Bundled, IntentStatus::Bundled]
		);
	}

	#[tokio::test]
	async fn test_malformed_receipt_fails_bundle() {
		let f = fixture(true, Outcome::BadReceipt);
		let bundle = closed_bundle(&f, 1);

		let failed = f.submitter.process(bundle.clone()).await.unwrap();
		assert_eq!(failed.status, BundleStatus::Failed);
		assert_eq!(member_statuses(&f, &bundle), vec![IntentStatus::Failed]);
	}

	#[tokio::test]
	async fn test_mined_bundle_executes_members() {
		let f = fixture(true, Outcome::Mined);
		let bundle = closed_bundle(&f, 2);

		let confirmed = f.submitter.process(bundle.clone()).await.unwrap();
		assert_eq!(confirmed.status, BundleStatus::Confirmed);
		assert_eq!(confirmed.block_number, Some(7));
		assert_eq!(
			member_statuses(&f, &bundle),
			vec![IntentStatus::Executed, IntentStatus::Executed]
		);
	}
}
