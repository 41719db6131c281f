//! Bundling and fair-ordering core.
//!
//! Wires the proof service, the intent registry and the collaborator
//! boundaries into a [`BundlerEngine`]: the batch scheduler decides when a
//! pending set closes, the submitter turns a closed bundle into one atomic
//! call, and the tracking facade answers read-only queries. Nothing here is a
//! global; [`BundlerBuilder`] constructs every piece from configuration and
//! named backend factories.

use bundler_config::BundlerConfig;
use bundler_delivery::{DeliveryInterface, DeliveryService};
use bundler_proof::{ProofInterface, ProofService};
use bundler_quote::{QuoteInterface, QuoteService};
use bundler_registry::{BundleStore, IntentRegistry};
use bundler_storage::{StorageInterface, StorageService};
use bundler_types::{Clock, ConfigSchema, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub mod engine;
pub mod error;
pub mod event_bus;
pub mod lifecycle;
pub mod scheduler;
pub mod submitter;
pub mod tracking;

pub use engine::BundlerEngine;
pub use error::CoreError;
pub use event_bus::EventBus;
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use scheduler::{BatchScheduler, CloseReason, SchedulerSettings, WindowPhase};
pub use submitter::BundleSubmitter;
pub use tracking::TrackingFacade;

pub type StorageFactory = Box<dyn Fn(&toml::Value) -> Box<dyn StorageInterface> + Send>;
pub type ProofFactory = Box<dyn Fn(&toml::Value) -> Box<dyn ProofInterface> + Send>;
pub type QuoteFactory = Box<dyn Fn(&toml::Value) -> Box<dyn QuoteInterface> + Send>;
pub type DeliveryFactory = Box<dyn Fn(&toml::Value) -> Box<dyn DeliveryInterface> + Send>;

/// Builds a [`BundlerEngine`] from configuration.
///
/// Each `[storage]`, `[proof]`, `[quote]` and `[delivery]` section names an
/// implementation; the builder looks the name up among the registered
/// factories and validates the section's `config` table against the
/// backend's schema before anything starts.
pub struct BundlerBuilder {
	config: BundlerConfig,
	clock: Option<Arc<dyn Clock>>,
	storage_factories: HashMap<String, StorageFactory>,
	proof_factories: HashMap<String, ProofFactory>,
	quote_factories: HashMap<String, QuoteFactory>,
	delivery_factories: HashMap<String, DeliveryFactory>,
}

impl BundlerBuilder {
	pub fn new(config: BundlerConfig) -> Self {
		Self {
			config,
			clock: None,
			storage_factories: HashMap::new(),
			proof_factories: HashMap::new(),
			quote_factories: HashMap::new(),
			delivery_factories: HashMap::new(),
		}
	}

	/// Replaces the system clock. Tests drive time through this.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn StorageInterface> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_proof_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn ProofInterface> + Send + 'static,
	{
		self.proof_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_quote_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn QuoteInterface> + Send + 'static,
	{
		self.quote_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_delivery_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn DeliveryInterface> + Send + 'static,
	{
		self.delivery_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn build(self) -> Result<BundlerEngine, CoreError> {
		let config = self.config;
		let settings = config.bundler.clone();
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

		let storage_backend = instantiate(
			"storage",
			&self.storage_factories,
			&config.storage.implementation,
			&config.storage.config,
			|backend: &Box<dyn StorageInterface>| backend.config_schema(),
		)?;
		let archive = Arc::new(StorageService::new(storage_backend));

		let proof_backend = instantiate(
			"proof",
			&self.proof_factories,
			&config.proof.implementation,
			&config.proof.config,
			|backend: &Box<dyn ProofInterface>| backend.config_schema(),
		)?;
		let proofs = Arc::new(ProofService::new(
			proof_backend,
			clock.clone(),
			settings.proof_freshness_ms,
			settings.proof_timeout(),
		));

		let quote_source = instantiate(
			"quote",
			&self.quote_factories,
			&config.quote.implementation,
			&config.quote.config,
			|source: &Box<dyn QuoteInterface>| source.config_schema(),
		)?;
		let quotes = Arc::new(QuoteService::new(quote_source, settings.quote_timeout()));

		let delivery_backend = instantiate(
			"delivery",
			&self.delivery_factories,
			&config.delivery.implementation,
			&config.delivery.config,
			|backend: &Box<dyn DeliveryInterface>| backend.config_schema(),
		)?;
		let delivery = Arc::new(DeliveryService::new(
			delivery_backend,
			settings.submission_timeout(),
		));

		let event_bus = EventBus::new(settings.event_capacity);
		let registry = Arc::new(IntentRegistry::new(
			clock.clone(),
			settings.intent_deadline_ms,
		));
		let bundles = Arc::new(BundleStore::new(clock.clone()));

		let submitter = Arc::new(BundleSubmitter::new(
			registry.clone(),
			bundles.clone(),
			quotes.clone(),
			delivery,
			event_bus.clone(),
		));
		let scheduler = Arc::new(BatchScheduler::new(
			SchedulerSettings {
				chain_id: settings.chain_id,
				max_bundle_size: settings.bundle_max_size,
				bundle_timeout_ms: settings.bundle_timeout_ms,
			},
			registry.clone(),
			bundles.clone(),
			proofs.clone(),
			submitter,
			event_bus.clone(),
			clock.clone(),
		));
		let tracking = TrackingFacade::new(
			registry.clone(),
			bundles.clone(),
			proofs,
			archive.clone(),
		);

		info!(
			storage = %config.storage.implementation,
			proof = %config.proof.implementation,
			quote = %config.quote.implementation,
			delivery = %config.delivery.implementation,
			"Bundler engine built"
		);

		Ok(BundlerEngine {
			settings,
			clock,
			registry,
			bundles,
			quotes,
			archive,
			scheduler,
			tracking,
			event_bus,
			lifecycle: LifecycleManager::new(),
			tick_task: Mutex::new(None),
		})
	}
}

/// Looks up a factory by name, builds the backend and validates its config.
fn instantiate<T>(
	kind: &str,
	factories: &HashMap<String, Box<dyn Fn(&toml::Value) -> T + Send>>,
	name: &str,
	config: &toml::Value,
	schema: impl Fn(&T) -> Box<dyn ConfigSchema>,
) -> Result<T, CoreError> {
	let factory = factories
		.get(name)
		.ok_or_else(|| CoreError::Config(format!("Unknown {} implementation '{}'", kind, name)))?;

	let backend = factory(config);
	schema(&backend)
		.validate(config)
		.map_err(|e| CoreError::Config(format!("Invalid {} config: {}", kind, e)))?;

	Ok(backend)
}
