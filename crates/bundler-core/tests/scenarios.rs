//! End-to-end behavior of the engine against scripted collaborators.

mod common;

use bundler_core::CoreError;
use bundler_registry::RegistryError;
use bundler_types::{BundleStatus, IntentStatus, U256};
use common::{harness, request, HarnessOptions};
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

#[tokio::test]
async fn test_bundle_preserves_arrival_order() {
	let h = harness(HarnessOptions {
		max_bundle_size: 3,
		..Default::default()
	});

	let mut ids = Vec::new();
	for seed in 1..=3u8 {
		let intent = h
			.engine
			.create_swap_intent(request(seed, 1_000 * seed as u64))
			.await
			.unwrap();
		ids.push(intent.id.clone());
		h.clock.advance(1);
	}

	// The third admission fills the batch.
	let last = h.engine.get_intent(&ids[2]).await.unwrap().unwrap();
	assert_ne!(last.status, IntentStatus::Pending);
	let bundle_id = last.bundle_id.unwrap();

	let bundle = h.engine.wait_for_bundle(&bundle_id, WAIT).await.unwrap();
	assert_eq!(bundle.status, BundleStatus::Confirmed);
	assert_eq!(bundle.members, ids);
	assert!(bundle.ordering_verified);
	assert!(bundle.aggregate_proof.is_some());

	let submitted = h.submitted.lock().unwrap().clone();
	assert_eq!(submitted.len(), 1);
	let order: Vec<String> = submitted[0]
		.operations
		.iter()
		.map(|op| op.intent_id.clone())
		.collect();
	assert_eq!(order, ids);

	for id in &ids {
		let intent = h.engine.wait_for_intent(id, WAIT).await.unwrap();
		assert_eq!(intent.status, IntentStatus::Executed);
	}
}

#[tokio::test]
async fn test_single_intent_closes_on_timeout() {
	let h = harness(HarnessOptions::default());

	let intent = h.engine.create_swap_intent(request(1, 500)).await.unwrap();
	assert_eq!(intent.status, IntentStatus::Pending);
	assert!(intent.fair_ordering_proof.is_some());

	h.clock.advance(9_999);
	assert!(h.engine.tick().await.unwrap().is_empty());

	h.clock.advance(1);
	let closed = h.engine.tick().await.unwrap();
	assert_eq!(closed.len(), 1);
	assert_eq!(closed[0].members, vec![intent.id.clone()]);

	let settled = h.engine.wait_for_intent(&intent.id, WAIT).await.unwrap();
	assert_eq!(settled.status, IntentStatus::Executed);
}

#[tokio::test]
async fn test_concurrent_triggers_close_once() {
	let h = harness(HarnessOptions::default());

	let mut ids = Vec::new();
	for seed in 1..=3u8 {
		ids.push(
			h.engine
				.create_swap_intent(request(seed, 700))
				.await
				.unwrap()
				.id,
		);
	}
	h.clock.advance(10_000);

	let (a, b, c) = tokio::join!(h.engine.tick(), h.engine.tick(), h.engine.tick());
	let closed: Vec<_> = [a.unwrap(), b.unwrap(), c.unwrap()]
		.into_iter()
		.flatten()
		.collect();

	assert_eq!(closed.len(), 1);
	assert_eq!(closed[0].members, ids);
	assert_eq!(h.engine.scheduler().closed_bundles().await, 1);
}

#[tokio::test]
async fn test_member_failure_is_isolated() {
	let h = harness(HarnessOptions {
		failing_amounts: vec![300],
		..Default::default()
	});

	let mut ids = Vec::new();
	for seed in 1..=5u8 {
		let intent = h
			.engine
			.create_swap_intent(request(seed, 100 * seed as u64))
			.await
			.unwrap();
		ids.push(intent.id);
	}

	let bundle_id = h
		.engine
		.get_intent(&ids[0])
		.await
		.unwrap()
		.unwrap()
		.bundle_id
		.unwrap();
	let bundle = h.engine.wait_for_bundle(&bundle_id, WAIT).await.unwrap();

	assert_eq!(bundle.status, BundleStatus::Confirmed);
	assert_eq!(bundle.members.len(), 5);
	assert_eq!(bundle.excluded, vec![ids[2].clone()]);

	let failed = h.engine.wait_for_intent(&ids[2], WAIT).await.unwrap();
	assert_eq!(failed.status, IntentStatus::Failed);
	assert!(failed.failure_reason.is_some());

	let survivors = [&ids[0], &ids[1], &ids[3], &ids[4]];
	for id in survivors {
		let intent = h.engine.wait_for_intent(id, WAIT).await.unwrap();
		assert_eq!(intent.status, IntentStatus::Executed);
	}

	let submitted = h.submitted.lock().unwrap().clone();
	let order: Vec<&String> = submitted[0]
		.operations
		.iter()
		.map(|op| &op.intent_id)
		.collect();
	assert_eq!(order, survivors);

	// The failed member is not retried.
	assert_eq!(submitted.len(), 1);
	assert_eq!(h.engine.stats().intents.get("failed"), Some(&1));
	assert_eq!(h.engine.stats().intents.get("executed"), Some(&4));
}

#[tokio::test]
async fn test_timeout_window_then_new_window() {
	let h = harness(HarnessOptions::default());

	let a = h.engine.create_swap_intent(request(1, 100)).await.unwrap();
	h.clock.advance(2_000);
	let b = h.engine.create_swap_intent(request(2, 200)).await.unwrap();

	h.clock.advance(8_000);
	let closed = h.engine.tick().await.unwrap();
	assert_eq!(closed.len(), 1);
	assert_eq!(closed[0].members, vec![a.id.clone(), b.id.clone()]);

	h.clock.advance(1_000);
	let c = h.engine.create_swap_intent(request(3, 300)).await.unwrap();
	assert_eq!(c.status, IntentStatus::Pending);
	assert!(h.engine.tick().await.unwrap().is_empty());

	let pending: Vec<String> = h
		.engine
		.get_pending_intents()
		.into_iter()
		.map(|intent| intent.id)
		.collect();
	assert_eq!(pending, vec![c.id.clone()]);
}

#[tokio::test]
async fn test_bundles_never_exceed_max_size() {
	let h = harness(HarnessOptions {
		max_bundle_size: 2,
		bundle_timeout_ms: 60_000,
		..Default::default()
	});

	let mut ids = Vec::new();
	for seed in 1..=5u8 {
		ids.push(
			h.engine
				.create_swap_intent(request(seed, 1_000))
				.await
				.unwrap()
				.id,
		);
	}

	let mut bundle_ids: Vec<String> = Vec::new();
	for id in &ids[..4] {
		let intent = h.engine.get_intent(id).await.unwrap().unwrap();
		let bundle_id = intent.bundle_id.expect("bundled");
		if !bundle_ids.contains(&bundle_id) {
			bundle_ids.push(bundle_id);
		}
	}
	assert_eq!(bundle_ids.len(), 2);

	for bundle_id in &bundle_ids {
		let bundle = h.engine.get_bundle(bundle_id).await.unwrap().unwrap();
		assert!(bundle.members.len() <= 2);
	}

	let fifth = h.engine.get_intent(&ids[4]).await.unwrap().unwrap();
	assert_eq!(fifth.status, IntentStatus::Pending);
}

#[tokio::test]
async fn test_cancel_and_terminal_immutability() {
	let h = harness(HarnessOptions::default());

	let intent = h.engine.create_swap_intent(request(1, 100)).await.unwrap();
	let cancelled = h.engine.cancel_intent(&intent.id).await.unwrap();
	assert_eq!(cancelled.status, IntentStatus::Failed);
	assert_eq!(cancelled.failure_reason.as_deref(), Some("cancelled"));

	assert!(matches!(
		h.engine.cancel_intent(&intent.id).await,
		Err(CoreError::Registry(RegistryError::InvalidTransition { .. }))
	));

	h.clock.advance(20_000);
	assert!(h.engine.tick().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reverted_bundle_fails_members() {
	let h = harness(HarnessOptions {
		max_bundle_size: 1,
		revert: true,
		..Default::default()
	});

	let intent = h.engine.create_swap_intent(request(1, 100)).await.unwrap();
	let settled = h.engine.wait_for_intent(&intent.id, WAIT).await.unwrap();
	assert_eq!(settled.status, IntentStatus::Failed);

	let bundle = h
		.engine
		.wait_for_bundle(settled.bundle_id.as_deref().unwrap(), WAIT)
		.await
		.unwrap();
	assert_eq!(bundle.status, BundleStatus::Failed);
	assert!(bundle.failure_reason.is_some());
}

#[tokio::test]
async fn test_rejects_malformed_requests() {
	let h = harness(HarnessOptions::default());

	let mut same_tokens = request(1, 100);
	same_tokens.to_token = same_tokens.from_token;
	assert!(matches!(
		h.engine.create_swap_intent(same_tokens).await,
		Err(CoreError::Registry(RegistryError::Validation(_)))
	));

	let mut other_chain = request(1, 100);
	other_chain.chain_id = Some(137);
	assert!(matches!(
		h.engine.create_swap_intent(other_chain).await,
		Err(CoreError::Registry(RegistryError::Validation(_)))
	));

	assert!(h.engine.get_pending_intents().is_empty());
}

#[tokio::test]
async fn test_quote_derives_slippage_floor() {
	let h = harness(HarnessOptions::default());

	let intent = h.engine.create_swap_intent(request(1, 10_000)).await.unwrap();
	// Two-for-one quote less 50 bps.
	assert_eq!(intent.min_to_amount, U256::from(19_900u64));

	let mut explicit = request(2, 10_000);
	explicit.min_to_amount = Some(U256::from(5u64));
	let intent = h.engine.create_swap_intent(explicit).await.unwrap();
	assert_eq!(intent.min_to_amount, U256::from(5u64));

	// A quote at the top of the range keeps a floor just under it.
	let mut huge = request(3, 1);
	huge.amount = U256::MAX;
	let intent = h.engine.create_swap_intent(huge).await.unwrap();
	assert!(intent.min_to_amount > U256::MAX / U256::from(2u64));
	assert!(intent.min_to_amount < U256::MAX);
}

#[tokio::test]
async fn test_unprovable_intent_fails_alone() {
	let h = harness(HarnessOptions {
		max_bundle_size: 3,
		unprovable_amounts: vec![300],
		..Default::default()
	});

	let a = h.engine.create_swap_intent(request(1, 100)).await.unwrap();
	let b = h.engine.create_swap_intent(request(2, 300)).await.unwrap();
	let c = h.engine.create_swap_intent(request(3, 200)).await.unwrap();

	assert_eq!(b.status, IntentStatus::Failed);
	assert!(b.fair_ordering_proof.is_none());
	let reason = b.failure_reason.unwrap();
	assert!(reason.starts_with("admission failed"));
	assert!(reason.contains("witness out of range"));

	// The failed intent does not count toward the size trigger.
	assert_eq!(a.status, IntentStatus::Pending);
	assert_eq!(c.status, IntentStatus::Pending);

	h.clock.advance(10_000);
	let closed = h.engine.tick().await.unwrap();
	assert_eq!(closed.len(), 1);
	assert_eq!(closed[0].members, vec![a.id, c.id]);
}

#[tokio::test]
async fn test_pending_intent_expires_at_deadline() {
	let h = harness(HarnessOptions {
		bundle_timeout_ms: 60_000,
		intent_deadline_ms: 5_000,
		..Default::default()
	});

	let intent = h.engine.create_swap_intent(request(1, 100)).await.unwrap();
	h.clock.advance(4_999);
	h.engine.tick().await.unwrap();
	assert_eq!(
		h.engine.get_intent(&intent.id).await.unwrap().unwrap().status,
		IntentStatus::Pending
	);

	h.clock.advance(1);
	assert!(h.engine.tick().await.unwrap().is_empty());

	let expired = h.engine.wait_for_intent(&intent.id, WAIT).await.unwrap();
	assert_eq!(expired.status, IntentStatus::Failed);
	assert_eq!(expired.failure_reason.as_deref(), Some("deadline expired"));
	assert!(expired.bundle_id.is_none());
	assert!(h.submitted.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_archived_entries_lapse_after_ttl() {
	let h = harness(HarnessOptions {
		archive_ttl_ms: 30_000,
		..Default::default()
	});

	let intent = h.engine.create_swap_intent(request(1, 100)).await.unwrap();
	h.engine.cancel_intent(&intent.id).await.unwrap();

	// Past the 60s retention window the intent moves to the archive.
	h.clock.advance(60_001);
	h.engine.tick().await.unwrap();
	let archived = h.engine.get_intent(&intent.id).await.unwrap().unwrap();
	assert_eq!(archived.status, IntentStatus::Failed);
	assert_eq!(h.engine.stats().intents.get("failed"), None);

	tokio::time::advance(Duration::from_secs(31)).await;
	assert!(h.engine.get_intent(&intent.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_wait_times_out_without_settling() {
	let h = harness(HarnessOptions::default());

	let intent = h.engine.create_swap_intent(request(1, 100)).await.unwrap();
	let result = h
		.engine
		.wait_for_intent(&intent.id, Some(Duration::from_millis(20)))
		.await;

	assert!(matches!(result, Err(CoreError::BundleTimeout { .. })));
	let current = h.engine.get_intent(&intent.id).await.unwrap().unwrap();
	assert_eq!(current.status, IntentStatus::Pending);
}
