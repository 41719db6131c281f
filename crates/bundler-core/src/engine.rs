//! The bundler engine.
//!
//! Owns every service, exposes the caller-facing operations and drives the
//! periodic tick that evaluates time-based closes and evicts settled
//! entities into the archive.

use crate::event_bus::EventBus;
use crate::lifecycle::{LifecycleManager, LifecycleState};
use crate::scheduler::BatchScheduler;
use crate::tracking::{TrackingFacade, BUNDLES_NAMESPACE, INTENTS_NAMESPACE};
use crate::CoreError;
use bundler_config::BundlerSettings;
use bundler_quote::QuoteService;
use bundler_registry::{intents::validate_request, BundleStore, IntentRegistry, RegistryError};
use bundler_storage::StorageService;
use bundler_types::{
	bps_of, Bundle, BundlerEvent, BundlerStats, Clock, CreateIntentRequest, IntentEvent,
	IntentRequest, ProtectionReport, QuoteRequest, SwapIntent, BPS_DENOMINATOR, U256,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Explicitly constructed, explicitly owned bundler service.
pub struct BundlerEngine {
	pub(crate) settings: BundlerSettings,
	pub(crate) clock: Arc<dyn Clock>,
	pub(crate) registry: Arc<IntentRegistry>,
	pub(crate) bundles: Arc<BundleStore>,
	pub(crate) quotes: Arc<QuoteService>,
	pub(crate) archive: Arc<StorageService>,
	pub(crate) scheduler: Arc<BatchScheduler>,
	pub(crate) tracking: TrackingFacade,
	pub(crate) event_bus: EventBus,
	pub(crate) lifecycle: LifecycleManager,
	pub(crate) tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl BundlerEngine {
	pub fn settings(&self) -> &BundlerSettings {
		&self.settings
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn scheduler(&self) -> &BatchScheduler {
		&self.scheduler
	}

	pub async fn state(&self) -> LifecycleState {
		self.lifecycle.state().await
	}

	/// Accepts a protected swap request.
	///
	/// Validation and quoting happen synchronously; a malformed request never
	/// enters the registry. The intent is then admitted, which may already
	/// close a batch. Settlement happens asynchronously.
	#[instrument(skip_all, fields(user = %request.user))]
	pub async fn create_swap_intent(
		&self,
		request: CreateIntentRequest,
	) -> Result<SwapIntent, CoreError> {
		let chain_id = request.chain_id.unwrap_or(self.settings.chain_id);
		if chain_id != self.settings.chain_id {
			return Err(RegistryError::Validation(format!(
				"chain {} is not served by this bundler",
				chain_id
			))
			.into());
		}

		let mut intent_request = IntentRequest {
			user: request.user,
			chain_id,
			from_token: request.from_token,
			to_token: request.to_token,
			from_amount: request.amount,
			min_to_amount: request.min_to_amount.unwrap_or_default(),
			slippage_bps: request.slippage_bps,
			mev_protection_requested: request.mev_protection,
		};
		validate_request(&intent_request)?;

		if request.min_to_amount.is_none() {
			intent_request.min_to_amount = self.quote_floor(&intent_request).await?;
		}

		let intent = self.registry.create(intent_request)?;
		info!(intent_id = %intent.id, "Intent created");
		self.event_bus
			.publish(BundlerEvent::Intent(IntentEvent::Created {
				intent_id: intent.id.clone(),
			}));

		self.scheduler.admit(intent).await
	}

	/// Quoted output less the slippage allowance.
	async fn quote_floor(&self, request: &IntentRequest) -> Result<U256, CoreError> {
		let quote = self
			.quotes
			.get_quote(&QuoteRequest {
				chain_id: request.chain_id,
				from_token: request.from_token,
				to_token: request.to_token,
				amount: request.from_amount,
				slippage_bps: request.slippage_bps,
				from: request.user,
			})
			.await?;

		let keep = BPS_DENOMINATOR.saturating_sub(u64::from(request.slippage_bps));
		Ok(bps_of(quote.to_amount, keep))
	}

	pub fn get_pending_intents(&self) -> Vec<SwapIntent> {
		self.tracking.pending_intents()
	}

	pub async fn get_intent(&self, id: &str) -> Result<Option<SwapIntent>, CoreError> {
		self.tracking.intent(id).await
	}

	pub fn get_active_bundles(&self) -> Vec<Bundle> {
		self.tracking.active_bundles()
	}

	pub async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>, CoreError> {
		self.tracking.bundle(id).await
	}

	pub async fn cancel_intent(&self, id: &str) -> Result<SwapIntent, CoreError> {
		self.scheduler.cancel(id).await
	}

	pub async fn protection_report(
		&self,
		bundle_id: &str,
	) -> Result<Option<ProtectionReport>, CoreError> {
		self.tracking.protection_report(bundle_id).await
	}

	pub fn estimated_savings(&self, intent: &SwapIntent) -> U256 {
		self.tracking.estimated_savings(intent)
	}

	pub fn stats(&self) -> BundlerStats {
		self.tracking.stats()
	}

	/// Waits until an intent reaches a terminal status.
	///
	/// Resolves from the event bus; a lagging subscription falls back to
	/// re-reading the registry. Returns [`CoreError::BundleTimeout`] when the
	/// bound elapses first, which says nothing about the intent's fate.
	pub async fn wait_for_intent(
		&self,
		id: &str,
		timeout: Option<Duration>,
	) -> Result<SwapIntent, CoreError> {
		let waited = timeout.unwrap_or_else(|| self.settings.submission_timeout());
		let mut events = self.event_bus.subscribe();

		let wait = self.intent_settled(id, &mut events);

		match tokio::time::timeout(waited, wait).await {
			Ok(result) => result,
			Err(_) => Err(CoreError::BundleTimeout {
				id: id.to_string(),
				waited,
			}),
		}
	}

	/// Waits until a bundle is confirmed or failed. Same contract as
	/// [`BundlerEngine::wait_for_intent`].
	pub async fn wait_for_bundle(
		&self,
		id: &str,
		timeout: Option<Duration>,
	) -> Result<Bundle, CoreError> {
		let waited = timeout.unwrap_or_else(|| self.settings.submission_timeout());
		let mut events = self.event_bus.subscribe();

		let wait = self.bundle_settled(id, &mut events);

		match tokio::time::timeout(waited, wait).await {
			Ok(result) => result,
			Err(_) => Err(CoreError::BundleTimeout {
				id: id.to_string(),
				waited,
			}),
		}
	}

	async fn intent_settled(
		&self,
		id: &str,
		events: &mut broadcast::Receiver<BundlerEvent>,
	) -> Result<SwapIntent, CoreError> {
		loop {
			match self.get_intent(id).await? {
				None => return Err(RegistryError::NotFound(id.to_string()).into()),
				Some(intent) if intent.status.is_terminal() => return Ok(intent),
				Some(_) => {}
			}
			next_event(events, |event| event.intent_id() == Some(id)).await?;
		}
	}

	async fn bundle_settled(
		&self,
		id: &str,
		events: &mut broadcast::Receiver<BundlerEvent>,
	) -> Result<Bundle, CoreError> {
		loop {
			match self.get_bundle(id).await? {
				None => return Err(RegistryError::NotFound(id.to_string()).into()),
				Some(bundle) if bundle.status.is_terminal() => return Ok(bundle),
				Some(_) => {}
			}
			next_event(events, |event| {
				matches!(event, BundlerEvent::Bundle(_)) && event.bundle_id() == Some(id)
			})
			.await?;
		}
	}

	/// One scheduler tick: time-based close evaluation, then eviction of
	/// settled entities past their retention window.
	pub async fn tick(&self) -> Result<Vec<Bundle>, CoreError> {
		let closed = self.scheduler.evaluate().await?;
		self.evict().await;
		Ok(closed)
	}

	async fn evict(&self) {
		let cutoff = self
			.clock
			.now_ms()
			.saturating_sub(self.settings.retention_ms);
		let ttl = self.settings.archive_ttl();

		for intent in self.registry.evict_terminal(cutoff) {
			if let Err(e) = self
				.archive
				.store_with_ttl(INTENTS_NAMESPACE, &intent.id, &intent, ttl)
				.await
			{
				error!(intent_id = %intent.id, "Failed to archive intent: {}", e);
			}
		}
		for bundle in self.bundles.evict_terminal(cutoff) {
			if let Err(e) = self
				.archive
				.store_with_ttl(BUNDLES_NAMESPACE, &bundle.id, &bundle, ttl)
				.await
			{
				error!(bundle_id = %bundle.id, "Failed to archive bundle: {}", e);
			}
		}
	}

	/// Starts the periodic tick. The engine must not have been started before.
	pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
		self.lifecycle.begin_start().await?;

		let engine = Arc::clone(self);
		let mut shutdown = self.lifecycle.subscribe_shutdown();
		let mut interval = tokio::time::interval(self.settings.tick_interval());
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = interval.tick() => {
						match engine.tick().await {
							Ok(closed) if !closed.is_empty() => {
								debug!("Tick closed {} bundle(s)", closed.len());
							}
							Ok(_) => {}
							Err(e) => error!("Tick failed: {}", e),
						}
					}
					_ = shutdown.recv() => {
						info!("Tick task stopping");
						break;
					}
				}
			}
		});
		*self.tick_task.lock().await = Some(handle);

		self.lifecycle.finish_start().await?;
		info!(name = %self.settings.name, "Bundler started");
		Ok(())
	}

	/// Stops the tick task. In-flight submissions are left to finish.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		self.lifecycle.shutdown().await?;

		if let Some(handle) = self.tick_task.lock().await.take() {
			if let Err(e) = handle.await {
				warn!("Tick task ended abnormally: {}", e);
			}
		}

		info!("Bundler stopped");
		Ok(())
	}
}

/// Waits for the next event matching `relevant`. A lagged receiver counts as
/// a match so the caller re-reads state.
async fn next_event(
	events: &mut broadcast::Receiver<BundlerEvent>,
	relevant: impl Fn(&BundlerEvent) -> bool,
) -> Result<(), CoreError> {
	loop {
		match events.recv().await {
			Ok(event) if relevant(&event) => return Ok(()),
			Ok(_) => continue,
			Err(RecvError::Lagged(skipped)) => {
				debug!("Event subscription lagged by {}", skipped);
				return Ok(());
			}
			Err(RecvError::Closed) => {
				return Err(CoreError::Lifecycle("event bus closed".into()));
			}
		}
	}
}
