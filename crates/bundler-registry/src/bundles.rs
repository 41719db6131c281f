//! Bundle store.
//!
//! The scheduler inserts a bundle when it closes a batch; from then on its
//! membership is frozen and only the submitter moves its status, through
//! [`BundleStore::transition`].

use crate::RegistryError;
use bundler_types::{
	generate_id, Bundle, BundleId, BundleStatus, BundleUpdate, Clock, TimestampMs,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Holds closed bundles by id.
pub struct BundleStore {
	bundles: DashMap<BundleId, Bundle>,
	sequence: AtomicU64,
	clock: Arc<dyn Clock>,
}

impl BundleStore {
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self {
			bundles: DashMap::new(),
			sequence: AtomicU64::new(0),
			clock,
		}
	}

	/// Reserves a fresh bundle id.
	pub fn next_id(&self) -> BundleId {
		generate_id("bundle", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
	}

	/// Stores a newly closed bundle.
	///
	/// The bundle must be pending, non-empty and not already stored.
	pub fn insert(&self, bundle: Bundle) -> Result<(), RegistryError> {
		if bundle.members.is_empty() {
			return Err(RegistryError::Validation(format!(
				"bundle {} has no members",
				bundle.id
			)));
		}
		if bundle.status != BundleStatus::Pending {
			return Err(RegistryError::Validation(format!(
				"bundle {} must start pending",
				bundle.id
			)));
		}

		match self.bundles.entry(bundle.id.clone()) {
			Entry::Occupied(_) => Err(RegistryError::Validation(format!(
				"bundle {} already exists",
				bundle.id
			))),
			Entry::Vacant(slot) => {
				debug!(
					"Stored bundle {} with {} members",
					bundle.id,
					bundle.members.len()
				);
				slot.insert(bundle);
				Ok(())
			}
		}
	}

	pub fn get(&self, id: &str) -> Option<Bundle> {
		self.bundles.get(id).map(|entry| entry.clone())
	}

	/// Bundles that have not reached a terminal status, oldest first.
	pub fn list_active(&self) -> Vec<Bundle> {
		let mut bundles: Vec<Bundle> = self
			.bundles
			.iter()
			.filter(|entry| entry.is_active())
			.map(|entry| entry.value().clone())
			.collect();
		bundles.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
		bundles
	}

	/// Moves a bundle to `to` if its current status is in `from`, applying
	/// the submission details carried by `update`.
	pub fn transition(
		&self,
		id: &str,
		from: &[BundleStatus],
		to: BundleStatus,
		update: BundleUpdate,
	) -> Result<Bundle, RegistryError> {
		let mut entry = self
			.bundles
			.get_mut(id)
			.ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

		let current = entry.status;
		if !from.contains(&current) || !current.can_transition_to(to) {
			error!(
				bundle_id = %id,
				from = %current,
				to = %to,
				"Rejected invalid bundle transition"
			);
			return Err(RegistryError::InvalidTransition {
				id: id.to_string(),
				from: current.to_string(),
				to: to.to_string(),
			});
		}

		entry.status = to;
		entry.updated_at = self.clock.now_ms();
		if update.tx_hash.is_some() {
			entry.tx_hash = update.tx_hash;
		}
		if update.block_number.is_some() {
			entry.block_number = update.block_number;
		}
		if update.failure_reason.is_some() {
			entry.failure_reason = update.failure_reason;
		}
		for excluded in update.excluded {
			if entry.members.contains(&excluded) && !entry.excluded.contains(&excluded) {
				entry.excluded.push(excluded);
			}
		}

		debug!("Bundle {} {} -> {}", id, current, to);
		Ok(entry.clone())
	}

	/// Removes terminal bundles last updated before `cutoff` and returns them.
	pub fn evict_terminal(&self, cutoff: TimestampMs) -> Vec<Bundle> {
		let expired: Vec<BundleId> = self
			.bundles
			.iter()
			.filter(|entry| entry.status.is_terminal() && entry.updated_at < cutoff)
			.map(|entry| entry.key().clone())
			.collect();

		expired
			.iter()
			.filter_map(|id| {
				self.bundles
					.remove_if(id, |_, bundle| bundle.status.is_terminal())
					.map(|(_, bundle)| bundle)
			})
			.collect()
	}

	/// Number of bundles per status.
	pub fn counts(&self) -> HashMap<BundleStatus, usize> {
		let mut counts = HashMap::new();
		for entry in self.bundles.iter() {
			*counts.entry(entry.status).or_insert(0) += 1;
		}
		counts
	}
}
