//! Intent registry.
//!
//! Holds every swap intent by id. Creation validates input, assigns an id and
//! a deadline; afterwards the only way to change an intent is through the
//! transition methods, all of which funnel into [`IntentRegistry::apply`].

use crate::RegistryError;
use bundler_types::{
	generate_id, Address, BundleId, Clock, FairOrderingProof, IntentId, IntentRequest,
	IntentStatus, SwapIntent, TimestampMs, U256,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Largest accepted slippage tolerance (100%).
const MAX_SLIPPAGE_BPS: u16 = 10_000;

/// Tracks swap intents through their lifecycle.
pub struct IntentRegistry {
	intents: DashMap<IntentId, SwapIntent>,
	sequence: AtomicU64,
	clock: Arc<dyn Clock>,
	/// Lifetime of a new intent; `deadline = created_at + deadline_ms`.
	deadline_ms: u64,
}

impl IntentRegistry {
	pub fn new(clock: Arc<dyn Clock>, deadline_ms: u64) -> Self {
		Self {
			intents: DashMap::new(),
			sequence: AtomicU64::new(0),
			clock,
			deadline_ms,
		}
	}

	/// Validates a request and inserts it as a pending intent.
	pub fn create(&self, request: IntentRequest) -> Result<SwapIntent, RegistryError> {
		validate_request(&request)?;

		let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
		let now = self.clock.now_ms();
		let intent = SwapIntent {
			id: generate_id("intent", sequence),
			user: request.user,
			chain_id: request.chain_id,
			from_token: request.from_token,
			to_token: request.to_token,
			from_amount: request.from_amount,
			min_to_amount: request.min_to_amount,
			deadline: now.saturating_add(self.deadline_ms),
			slippage_bps: request.slippage_bps,
			mev_protection_requested: request.mev_protection_requested,
			fair_ordering_proof: None,
			status: IntentStatus::Pending,
			created_at: now,
			updated_at: now,
			sequence,
			bundle_id: None,
			failure_reason: None,
		};

		debug!("Registered intent {} for {}", intent.id, intent.user);
		self.intents.insert(intent.id.clone(), intent.clone());
		Ok(intent)
	}

	pub fn get(&self, id: &str) -> Option<SwapIntent> {
		self.intents.get(id).map(|entry| entry.clone())
	}

	/// All intents with the given status, in insertion order.
	pub fn list_by_status(&self, status: IntentStatus) -> Vec<SwapIntent> {
		let mut intents: Vec<SwapIntent> = self
			.intents
			.iter()
			.filter(|entry| entry.status == status)
			.map(|entry| entry.value().clone())
			.collect();
		intents.sort_by_key(|intent| intent.sequence);
		intents
	}

	/// Moves an intent to `to` if its current status is in `from`.
	pub fn transition(
		&self,
		id: &str,
		from: &[IntentStatus],
		to: IntentStatus,
	) -> Result<SwapIntent, RegistryError> {
		self.apply(id, from, to, |_| {})
	}

	/// Claims a pending intent for a bundle.
	pub fn assign_to_bundle(
		&self,
		id: &str,
		bundle_id: &BundleId,
	) -> Result<SwapIntent, RegistryError> {
		self.apply(id, &[IntentStatus::Pending], IntentStatus::Bundled, |intent| {
			intent.bundle_id = Some(bundle_id.clone());
		})
	}

	/// Fails an intent whose status is in `from`, recording why.
	pub fn fail(
		&self,
		id: &str,
		from: &[IntentStatus],
		reason: impl Into<String>,
	) -> Result<SwapIntent, RegistryError> {
		let reason = reason.into();
		self.apply(id, from, IntentStatus::Failed, |intent| {
			intent.failure_reason = Some(reason);
		})
	}

	/// Attaches the fair-ordering proof to a pending intent. Once attached,
	/// the proof never changes.
	pub fn attach_proof(
		&self,
		id: &str,
		proof: FairOrderingProof,
	) -> Result<SwapIntent, RegistryError> {
		let mut entry = self
			.intents
			.get_mut(id)
			.ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

		if entry.fair_ordering_proof.is_some() {
			return Err(RegistryError::ProofAlreadyAttached(id.to_string()));
		}
		if entry.status != IntentStatus::Pending {
			return Err(RegistryError::InvalidTransition {
				id: id.to_string(),
				from: entry.status.to_string(),
				to: "admitted".to_string(),
			});
		}

		entry.fair_ordering_proof = Some(proof);
		entry.updated_at = self.clock.now_ms();
		Ok(entry.clone())
	}

	/// Removes terminal intents last updated before `cutoff` and returns them.
	pub fn evict_terminal(&self, cutoff: TimestampMs) -> Vec<SwapIntent> {
		let expired: Vec<IntentId> = self
			.intents
			.iter()
			.filter(|entry| entry.status.is_terminal() && entry.updated_at < cutoff)
			.map(|entry| entry.key().clone())
			.collect();

		expired
			.iter()
			.filter_map(|id| {
				self.intents
					.remove_if(id, |_, intent| intent.status.is_terminal())
					.map(|(_, intent)| intent)
			})
			.collect()
	}

	/// Number of intents per status.
	pub fn counts(&self) -> HashMap<IntentStatus, usize> {
		let mut counts = HashMap::new();
		for entry in self.intents.iter() {
			*counts.entry(entry.status).or_insert(0) += 1;
		}
		counts
	}

	pub fn len(&self) -> usize {
		self.intents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.intents.is_empty()
	}

	/// The one place an intent's status changes.
	///
	/// Holds the entry's shard lock for the whole check-and-set, so two
	/// concurrent transitions on the same intent cannot both succeed.
	fn apply(
		&self,
		id: &str,
		from: &[IntentStatus],
		to: IntentStatus,
		mutate: impl FnOnce(&mut SwapIntent),
	) -> Result<SwapIntent, RegistryError> {
		let mut entry = self
			.intents
			.get_mut(id)
			.ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

		let current = entry.status;
		if !from.contains(&current) || !current.can_transition_to(to) {
			error!(
				intent_id = %id,
				from = %current,
				to = %to,
				"Rejected invalid intent transition"
			);
			return Err(RegistryError::InvalidTransition {
				id: id.to_string(),
				from: current.to_string(),
				to: to.to_string(),
			});
		}

		entry.status = to;
		entry.updated_at = self.clock.now_ms();
		mutate(&mut *entry);

		debug!("Intent {} {} -> {}", id, current, to);
		Ok(entry.clone())
	}
}

pub fn validate_request(request: &IntentRequest) -> Result<(), RegistryError> {
	let invalid = |message: &str| -> Result<(), RegistryError> {
		Err(RegistryError::Validation(message.to_string()))
	};

	if request.user == Address::ZERO {
		return invalid("user address is empty");
	}
	if request.from_token == Address::ZERO || request.to_token == Address::ZERO {
		return invalid("token address is empty");
	}
	if request.from_token == request.to_token {
		return invalid("from and to tokens are identical");
	}
	if request.from_amount == U256::ZERO {
		return invalid("amount must be positive");
	}
	if request.chain_id == 0 {
		return invalid("chain id must be positive");
	}
	if request.slippage_bps > MAX_SLIPPAGE_BPS {
		return invalid("slippage exceeds 10000 bps");
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use bundler_types::{Bytes, ManualClock, ProofBlob, B256};

	fn registry() -> (IntentRegistry, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::new(1_000));
		(IntentRegistry::new(clock.clone(), 60_000), clock)
	}

	fn request() -> IntentRequest {
		IntentRequest {
			user: Address::repeat_byte(0xaa),
			chain_id: 1,
			from_token: Address::repeat_byte(0x01),
			to_token: Address::repeat_byte(0x02),
			from_amount: U256::from(100u64),
			min_to_amount: U256::from(95u64),
			slippage_bps: 50,
			mev_protection_requested: true,
		}
	}

	fn proof() -> FairOrderingProof {
		FairOrderingProof {
			commitment: B256::repeat_byte(1),
			nullifier: B256::repeat_byte(2),
			timestamp: 1_000,
			proof: ProofBlob {
				protocol: "test".into(),
				circuit_version: 1,
				payload: Bytes::new(),
				public_signals: vec![],
			},
			is_valid: true,
		}
	}

	#[test]
	fn test_create_assigns_defaults() {
		let (registry, _) = registry();
		let intent = registry.create(request()).unwrap();

		assert_eq!(intent.status, IntentStatus::Pending);
		assert_eq!(intent.created_at, 1_000);
		assert_eq!(intent.deadline, 61_000);
		assert!(intent.fair_ordering_proof.is_none());
		assert_eq!(registry.get(&intent.id), Some(intent));
	}

	#[test]
	fn test_create_rejects_malformed_input() {
		let (registry, _) = registry();

		let mut zero_amount = request();
		zero_amount.from_amount = U256::ZERO;
		assert!(matches!(
			registry.create(zero_amount),
			Err(RegistryError::Validation(_))
		));

		let mut empty_user = request();
		empty_user.user = Address::ZERO;
		assert!(matches!(
			registry.create(empty_user),
			Err(RegistryError::Validation(_))
		));

		assert!(registry.is_empty());
	}

	#[test]
	fn test_ids_are_unique_and_listing_keeps_insertion_order() {
		let (registry, clock) = registry();
		let mut ids = Vec::new();
		for _ in 0..10 {
			ids.push(registry.create(request()).unwrap().id);
			clock.advance(1);
		}

		let listed: Vec<_> = registry
			.list_by_status(IntentStatus::Pending)
			.into_iter()
			.map(|intent| intent.id)
			.collect();
		assert_eq!(listed, ids);

		let mut sorted = ids.clone();
		sorted.sort();
		sorted.dedup();
		assert_eq!(sorted, ids);
	}

	#[test]
	fn test_terminal_states_are_immutable() {
		let (registry, _) = registry();
		let id = registry.create(request()).unwrap().id;

		registry
			.assign_to_bundle(&id, &"bundle-1".to_string())
			.unwrap();
		registry
			.transition(&id, &[IntentStatus::Bundled], IntentStatus::Executed)
			.unwrap();

		for to in [
			IntentStatus::Pending,
			IntentStatus::Bundled,
			IntentStatus::Executed,
			IntentStatus::Failed,
		] {
			let all = [
				IntentStatus::Pending,
				IntentStatus::Bundled,
				IntentStatus::Executed,
				IntentStatus::Failed,
			];
			assert!(matches!(
				registry.transition(&id, &all, to),
				Err(RegistryError::InvalidTransition { .. })
			));
		}
		assert_eq!(registry.get(&id).unwrap().status, IntentStatus::Executed);
	}

	#[test]
	fn test_transition_checks_from_set() {
		let (registry, _) = registry();
		let id = registry.create(request()).unwrap().id;

		// Allowed by the table, but the caller expected a bundled intent.
		assert!(matches!(
			registry.fail(&id, &[IntentStatus::Bundled], "late"),
			Err(RegistryError::InvalidTransition { .. })
		));

		let failed = registry
			.fail(&id, &[IntentStatus::Pending], "cancelled")
			.unwrap();
		assert_eq!(failed.status, IntentStatus::Failed);
		assert_eq!(failed.failure_reason.as_deref(), Some("cancelled"));
	}

	#[test]
	fn test_proof_attaches_once() {
		let (registry, _) = registry();
		let id = registry.create(request()).unwrap().id;

		let admitted = registry.attach_proof(&id, proof()).unwrap();
		assert!(admitted.is_admitted());
		assert!(matches!(
			registry.attach_proof(&id, proof()),
			Err(RegistryError::ProofAlreadyAttached(_))
		));
	}

	#[test]
	fn test_unknown_intent() {
		let (registry, _) = registry();
		assert!(registry.get("missing").is_none());
		assert!(matches!(
			registry.transition("missing", &[IntentStatus::Pending], IntentStatus::Bundled),
			Err(RegistryError::NotFound(_))
		));
	}

	#[test]
	fn test_evict_terminal_only() {
		let (registry, clock) = registry();
		let done = registry.create(request()).unwrap().id;
		let waiting = registry.create(request()).unwrap().id;
		registry
			.fail(&done, &[IntentStatus::Pending], "cancelled")
			.unwrap();

		clock.advance(10_000);
		let evicted = registry.evict_terminal(clock.now_ms());

		assert_eq!(evicted.len(), 1);
		assert_eq!(evicted[0].id, done);
		assert!(registry.get(&done).is_none());
		assert!(registry.get(&waiting).is_some());
		assert_eq!(registry.counts().get(&IntentStatus::Pending), Some(&1));
	}
}
