//! Batch scheduler.
//!
//! Admits intents by attaching a fair-ordering proof, then decides when the
//! pending set becomes a closed bundle. A batch closes when it reaches the
//! size limit or when its oldest member has waited for the bundle timeout.
//!
//! Evaluation is a critical section: the window mutex admits one evaluation
//! at a time, so a size trigger and a tick firing together close the batch
//! once. Intents admitted while a batch is closing are not part of its
//! snapshot and land in the next one.

use crate::event_bus::EventBus;
use crate::submitter::BundleSubmitter;
use crate::CoreError;
use bundler_proof::{ProofError, ProofService};
use bundler_registry::{BundleStore, IntentRegistry, RegistryError};
use bundler_types::{
	Bundle, BundleEvent, BundleStatus, BundlerEvent, Clock, FairOrderingProof, IntentEvent,
	IntentStatus, ProofInput, SwapIntent, TimestampMs,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Batch closing knobs.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
	pub chain_id: u64,
	pub max_bundle_size: usize,
	pub bundle_timeout_ms: u64,
}

/// Phase of the in-flight batch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
	Collecting,
	Closing,
}

/// Why a batch closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
	/// The pending set reached the size limit.
	Size,
	/// The oldest pending intent waited for the bundle timeout.
	Timeout,
}

impl fmt::Display for CloseReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Size => write!(f, "size"),
			Self::Timeout => write!(f, "timeout"),
		}
	}
}

#[derive(Debug)]
struct BatchWindow {
	phase: WindowPhase,
	closed_bundles: u64,
}

pub struct BatchScheduler {
	settings: SchedulerSettings,
	registry: Arc<IntentRegistry>,
	bundles: Arc<BundleStore>,
	proofs: Arc<ProofService>,
	submitter: Arc<BundleSubmitter>,
	event_bus: EventBus,
	clock: Arc<dyn Clock>,
	window: Mutex<BatchWindow>,
}

impl BatchScheduler {
	pub fn new(
		settings: SchedulerSettings,
		registry: Arc<IntentRegistry>,
		bundles: Arc<BundleStore>,
		proofs: Arc<ProofService>,
		submitter: Arc<BundleSubmitter>,
		event_bus: EventBus,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			settings,
			registry,
			bundles,
			proofs,
			submitter,
			event_bus,
			clock,
			window: Mutex::new(BatchWindow {
				phase: WindowPhase::Collecting,
				closed_bundles: 0,
			}),
		}
	}

	/// Attaches a fresh fair-ordering proof to a pending intent, then
	/// re-evaluates the close condition.
	///
	/// If the proof cannot be generated, verified or its nullifier was seen
	/// before, the intent fails individually with the reason recorded and is
	/// returned in that state. Returns the intent as it stands after the
	/// evaluation, so it may already be bundled.
	#[instrument(skip_all, fields(intent_id = %intent.id))]
	pub async fn admit(&self, intent: SwapIntent) -> Result<SwapIntent, CoreError> {
		let proof = match self.prove(&intent).await {
			Ok(proof) => proof,
			Err(e) => {
				warn!("Admission failed: {}", e);
				return self
					.fail_pending(&intent.id, format!("admission failed: {}", e))
					.or_else(|_| self.current(&intent.id));
			}
		};

		match self.registry.attach_proof(&intent.id, proof) {
			Ok(_) => {
				debug!("Intent admitted");
				self.event_bus
					.publish(BundlerEvent::Intent(IntentEvent::Admitted {
						intent_id: intent.id.clone(),
					}));
			}
			// Cancelled while its proof was being generated.
			Err(RegistryError::InvalidTransition { .. }) => {
				return self.current(&intent.id);
			}
			Err(e) => return Err(e.into()),
		}

		self.evaluate().await?;
		self.current(&intent.id)
	}

	async fn prove(&self, intent: &SwapIntent) -> Result<FairOrderingProof, ProofError> {
		let input = ProofInput {
			user: intent.user,
			chain_id: intent.chain_id,
			from_token: intent.from_token,
			to_token: intent.to_token,
			from_amount: intent.from_amount,
			timestamp: intent.created_at,
		};

		let proof = self.proofs.prove_intent(&input).await?;
		if !self.proofs.verify_intent_proof(&proof) {
			return Err(ProofError::Verification(
				"proof rejected at admission".into(),
			));
		}
		self.proofs.register_nullifier(&proof)?;
		Ok(proof)
	}

	/// Evaluates the close condition and closes as many batches as it holds
	/// for. Expired pending intents fail first. Returns the closed bundles,
	/// whose submission has been handed off.
	pub async fn evaluate(&self) -> Result<Vec<Bundle>, CoreError> {
		let mut window = self.window.lock().await;
		let now = self.clock.now_ms();

		self.expire_pending(now);

		let mut closed = Vec::new();
		loop {
			let candidates = self.candidates();
			let Some(reason) = self.close_reason(&candidates, now) else {
				break;
			};

			window.phase = WindowPhase::Closing;
			let take = candidates.len().min(self.settings.max_bundle_size);
			let result = self.close(&candidates[..take], reason, now).await;
			window.phase = WindowPhase::Collecting;

			match result? {
				Some(bundle) => {
					window.closed_bundles += 1;
					self.hand_off(bundle.clone());
					closed.push(bundle);
				}
				// Nothing could be claimed; the same snapshot would repeat.
				None => break,
			}
		}

		Ok(closed)
	}

	/// Cancels a pending intent.
	///
	/// Runs inside the window lock, so it never races a closing batch. Once
	/// an intent is bundled it can no longer be cancelled.
	pub async fn cancel(&self, intent_id: &str) -> Result<SwapIntent, CoreError> {
		let _window = self.window.lock().await;
		let intent = self
			.registry
			.fail(intent_id, &[IntentStatus::Pending], "cancelled")?;

		info!(intent_id = %intent_id, "Intent cancelled");
		self.event_bus
			.publish(BundlerEvent::Intent(IntentEvent::Failed {
				intent_id: intent_id.to_string(),
				reason: "cancelled".into(),
			}));
		Ok(intent)
	}

	pub async fn phase(&self) -> WindowPhase {
		self.window.lock().await.phase
	}

	pub async fn closed_bundles(&self) -> u64 {
		self.window.lock().await.closed_bundles
	}

	/// Admitted pending intents, oldest first with ties broken by id.
	fn candidates(&self) -> Vec<SwapIntent> {
		let mut candidates: Vec<SwapIntent> = self
			.registry
			.list_by_status(IntentStatus::Pending)
			.into_iter()
			.filter(SwapIntent::is_admitted)
			.collect();
		candidates.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
		candidates
	}

	fn close_reason(&self, candidates: &[SwapIntent], now: TimestampMs) -> Option<CloseReason> {
		let oldest = candidates.first()?;

		if candidates.len() >= self.settings.max_bundle_size {
			Some(CloseReason::Size)
		} else if now.saturating_sub(oldest.created_at) >= self.settings.bundle_timeout_ms {
			Some(CloseReason::Timeout)
		} else {
			None
		}
	}

	fn expire_pending(&self, now: TimestampMs) {
		for intent in self.registry.list_by_status(IntentStatus::Pending) {
			if intent.is_expired(now) {
				if let Ok(failed) = self.fail_pending(&intent.id, "deadline expired".to_string()) {
					debug!(intent_id = %failed.id, "Intent expired before bundling");
				}
			}
		}
	}

	/// Claims the members and stores the bundle. Membership is fixed here.
	async fn close(
		&self,
		members: &[SwapIntent],
		reason: CloseReason,
		now: TimestampMs,
	) -> Result<Option<Bundle>, CoreError> {
		let bundle_id = self.bundles.next_id();

		let mut claimed = Vec::with_capacity(members.len());
		for intent in members {
			match self.registry.assign_to_bundle(&intent.id, &bundle_id) {
				Ok(intent) => claimed.push(intent),
				Err(e) => error!(intent_id = %intent.id, "Could not claim intent: {}", e),
			}
		}
		if claimed.is_empty() {
			return Ok(None);
		}

		let proofs: Vec<FairOrderingProof> = claimed
			.iter()
			.filter_map(|intent| intent.fair_ordering_proof.clone())
			.collect();

		let ordering_verified = self.proofs.verify_batch_ordering(&proofs);
		if !ordering_verified {
			warn!(bundle_id = %bundle_id, "Batch ordering audit failed");
		}

		let aggregate_proof = match self.proofs.prove_batch(&proofs).await {
			Ok(aggregate) => Some(aggregate),
			Err(e) => {
				warn!(bundle_id = %bundle_id, "Aggregate proof unavailable: {}", e);
				None
			}
		};

		let bundle = Bundle {
			id: bundle_id,
			chain_id: self.settings.chain_id,
			members: claimed.iter().map(|intent| intent.id.clone()).collect(),
			excluded: vec![],
			status: BundleStatus::Pending,
			created_at: now,
			updated_at: now,
			tx_hash: None,
			block_number: None,
			aggregate_proof,
			ordering_verified,
			failure_reason: None,
		};
		self.bundles.insert(bundle.clone())?;

		info!(
			bundle_id = %bundle.id,
			members = bundle.members.len(),
			reason = %reason,
			"Closed bundle"
		);
		self.event_bus
			.publish(BundlerEvent::Bundle(BundleEvent::Closed {
				bundle_id: bundle.id.clone(),
				members: bundle.members.clone(),
			}));

		Ok(Some(bundle))
	}

	fn hand_off(&self, bundle: Bundle) {
		let submitter = self.submitter.clone();
		tokio::spawn(async move {
			let bundle_id = bundle.id.clone();
			if let Err(e) = submitter.process(bundle).await {
				error!(bundle_id = %bundle_id, "Bundle processing failed: {}", e);
			}
		});
	}

	fn fail_pending(&self, intent_id: &str, reason: String) -> Result<SwapIntent, CoreError> {
		let failed = self
			.registry
			.fail(intent_id, &[IntentStatus::Pending], reason.clone())?;
		self.event_bus
			.publish(BundlerEvent::Intent(IntentEvent::Failed {
				intent_id: intent_id.to_string(),
				reason,
			}));
		Ok(failed)
	}

	fn current(&self, intent_id: &str) -> Result<SwapIntent, CoreError> {
		self.registry
			.get(intent_id)
			.ok_or_else(|| RegistryError::NotFound(intent_id.to_string()).into())
	}
}
