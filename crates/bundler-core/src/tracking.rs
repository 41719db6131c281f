//! Read-only views over intents and bundles.
//!
//! Used by external callers to poll state. Entities evicted from the active
//! registry are looked up in the archive. Savings and protection figures are
//! advisory display values, not guarantees.

use crate::CoreError;
use bundler_proof::ProofService;
use bundler_registry::{BundleStore, IntentRegistry};
use bundler_storage::StorageService;
use bundler_types::{
	bps_of, Bundle, BundlerStats, IntentStatus, ProtectionReport, SwapIntent, U256,
};
use std::sync::Arc;

/// Storage namespace for archived intents.
pub const INTENTS_NAMESPACE: &str = "intents";
/// Storage namespace for archived bundles.
pub const BUNDLES_NAMESPACE: &str = "bundles";

pub struct TrackingFacade {
	registry: Arc<IntentRegistry>,
	bundles: Arc<BundleStore>,
	proofs: Arc<ProofService>,
	archive: Arc<StorageService>,
}

impl TrackingFacade {
	pub fn new(
		registry: Arc<IntentRegistry>,
		bundles: Arc<BundleStore>,
		proofs: Arc<ProofService>,
		archive: Arc<StorageService>,
	) -> Self {
		Self {
			registry,
			bundles,
			proofs,
			archive,
		}
	}

	/// Pending intents in insertion order.
	pub fn pending_intents(&self) -> Vec<SwapIntent> {
		self.registry.list_by_status(IntentStatus::Pending)
	}

	/// Bundles not yet confirmed or failed, oldest first.
	pub fn active_bundles(&self) -> Vec<Bundle> {
		self.bundles.list_active()
	}

	pub async fn intent(&self, id: &str) -> Result<Option<SwapIntent>, CoreError> {
		if let Some(intent) = self.registry.get(id) {
			return Ok(Some(intent));
		}
		Ok(self.archive.retrieve_optional(INTENTS_NAMESPACE, id).await?)
	}

	pub async fn bundle(&self, id: &str) -> Result<Option<Bundle>, CoreError> {
		if let Some(bundle) = self.bundles.get(id) {
			return Ok(Some(bundle));
		}
		Ok(self.archive.retrieve_optional(BUNDLES_NAMESPACE, id).await?)
	}

	/// Advisory estimate of the value protected from MEV extraction.
	///
	/// Half the slippage allowance when protection was requested, zero
	/// otherwise. No market data goes into it.
	pub fn estimated_savings(&self, intent: &SwapIntent) -> U256 {
		if !intent.mev_protection_requested {
			return U256::ZERO;
		}
		bps_of(intent.from_amount, u64::from(intent.slippage_bps)) / U256::from(2u64)
	}

	/// Average proof score over the members of a bundle, 0 to 100.
	///
	/// Members without a proof, or no longer found, count as zero.
	pub async fn protection_score(&self, bundle: &Bundle) -> Result<u8, CoreError> {
		if bundle.members.is_empty() {
			return Ok(0);
		}

		let mut total: u32 = 0;
		for member in &bundle.members {
			let score = self
				.intent(member)
				.await?
				.and_then(|intent| intent.fair_ordering_proof)
				.map(|proof| self.proofs.score_proof(&proof))
				.unwrap_or(0);
			total += u32::from(score);
		}

		Ok((total / bundle.members.len() as u32) as u8)
	}

	pub async fn protection_report(
		&self,
		bundle_id: &str,
	) -> Result<Option<ProtectionReport>, CoreError> {
		let Some(bundle) = self.bundle(bundle_id).await? else {
			return Ok(None);
		};

		Ok(Some(ProtectionReport {
			score: self.protection_score(&bundle).await?,
			ordering_verified: bundle.ordering_verified,
			bundle_id: bundle.id,
		}))
	}

	/// Counts per status over the active registry and the summed savings
	/// estimate of intents that have not failed.
	pub fn stats(&self) -> BundlerStats {
		let intents = self
			.registry
			.counts()
			.into_iter()
			.map(|(status, count)| (status.to_string(), count))
			.collect();
		let bundles = self
			.bundles
			.counts()
			.into_iter()
			.map(|(status, count)| (status.to_string(), count))
			.collect();

		let estimated_savings = [
			IntentStatus::Pending,
			IntentStatus::Bundled,
			IntentStatus::Executed,
		]
		.into_iter()
		.flat_map(|status| self.registry.list_by_status(status))
		.fold(U256::ZERO, |acc, intent| {
			acc.saturating_add(self.estimated_savings(&intent))
		});

		BundlerStats {
			intents,
			bundles,
			estimated_savings,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bundler_proof::implementations::commitment::CommitmentProver;
	use bundler_storage::implementations::memory::MemoryStorage;
	use bundler_types::{
		Address, BundleStatus, Clock, IntentRequest, ManualClock, ProofInput,
	};
	use std::time::Duration;

	const NOW: u64 = 1_700_000_000_000;

	struct Fixture {
		clock: Arc<ManualClock>,
		registry: Arc<IntentRegistry>,
		bundles: Arc<BundleStore>,
		proofs: Arc<ProofService>,
		archive: Arc<StorageService>,
		tracking: TrackingFacade,
	}

	fn fixture() -> Fixture {
		let clock = Arc::new(ManualClock::new(NOW));
		let registry = Arc::new(IntentRegistry::new(clock.clone(), 600_000));
		let bundles = Arc::new(BundleStore::new(clock.clone()));
		let proofs = Arc::new(ProofService::new(
			Box::new(CommitmentProver::new(1, Duration::ZERO)),
			clock.clone(),
			300_000,
			Duration::from_secs(1),
		));
		let archive = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let tracking = TrackingFacade::new(
			registry.clone(),
			bundles.clone(),
			proofs.clone(),
			archive.clone(),
		);
		Fixture {
			clock,
			registry,
			bundles,
			proofs,
			archive,
			tracking,
		}
	}

	fn request(amount: u64, slippage_bps: u16, mev: bool) -> IntentRequest {
		IntentRequest {
			user: Address::repeat_byte(0xaa),
			chain_id: 1,
			from_token: Address::repeat_byte(0x01),
			to_token: Address::repeat_byte(0x02),
			from_amount: U256::from(amount),
			min_to_amount: U256::ZERO,
			slippage_bps,
			mev_protection_requested: mev,
		}
	}

	fn bundle_of(f: &Fixture, members: Vec<String>) -> Bundle {
		Bundle {
			id: f.bundles.next_id(),
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
		}
	}

	async fn admitted(f: &Fixture, amount: u64) -> SwapIntent {
		let intent = f.registry.create(request(amount, 100, true)).unwrap();
		let proof = f
			.proofs
			.prove_intent(&ProofInput {
				user: intent.user,
				chain_id: intent.chain_id,
				from_token: intent.from_token,
				to_token: intent.to_token,
				from_amount: intent.from_amount,
				timestamp: intent.created_at,
			})
			.await
			.unwrap();
		f.registry.attach_proof(&intent.id, proof).unwrap()
	}

	#[test]
	fn test_estimated_savings_heuristic() {
		let f = fixture();
		let protected = f.registry.create(request(1_000_000, 100, true)).unwrap();
		let unprotected = f.registry.create(request(1_000_000, 100, false)).unwrap();

		// 1% slippage allowance, half of it.
		assert_eq!(
			f.tracking.estimated_savings(&protected),
			U256::from(5_000u64)
		);
		assert_eq!(f.tracking.estimated_savings(&unprotected), U256::ZERO);
		assert_eq!(f.tracking.stats().estimated_savings, U256::from(5_000u64));
		assert_eq!(f.tracking.stats().intents.get("pending"), Some(&2));
	}

	#[test]
	fn test_estimated_savings_on_huge_amounts() {
		let f = fixture();
		let mut intent = f.registry.create(request(1, 10_000, true)).unwrap();
		intent.from_amount = U256::MAX;

		let savings = f.tracking.estimated_savings(&intent);
		assert!(savings > U256::MAX / U256::from(4u64));
		assert!(savings <= U256::MAX / U256::from(2u64));
	}

	#[tokio::test]
	async fn test_protection_score_averages_members() {
		let f = fixture();
		let a = admitted(&f, 10).await;
		let b = f.registry.create(request(20, 100, true)).unwrap();

		let bundle = bundle_of(&f, vec![a.id.clone(), b.id.clone()]);
		f.bundles.insert(bundle.clone()).unwrap();

		// A scores 100, B has no proof.
		assert_eq!(f.tracking.protection_score(&bundle).await.unwrap(), 50);

		let report = f
			.tracking
			.protection_report(&bundle.id)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(report.score, 50);
		assert!(report.ordering_verified);
		assert!(f.tracking.protection_report("nope").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_archived_intents_stay_queryable() {
		let f = fixture();
		let intent = f.registry.create(request(10, 100, true)).unwrap();
		f.registry
			.fail(&intent.id, &[IntentStatus::Pending], "cancelled")
			.unwrap();

		f.clock.advance(1_000);
		for evicted in f.registry.evict_terminal(f.clock.now_ms()) {
			f.archive
				.store(INTENTS_NAMESPACE, &evicted.id, &evicted)
				.await
				.unwrap();
		}

		let found = f.tracking.intent(&intent.id).await.unwrap().unwrap();
		assert_eq!(found.status, IntentStatus::Failed);
		assert!(f.tracking.pending_intents().is_empty());
	}
}
