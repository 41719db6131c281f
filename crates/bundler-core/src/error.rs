//! Error type for the bundler core.

use bundler_delivery::DeliveryError;
use bundler_proof::ProofError;
use bundler_quote::QuoteError;
use bundler_registry::RegistryError;
use bundler_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Proof(#[from] ProofError),

	#[error(transparent)]
	Quote(#[from] QuoteError),

	#[error(transparent)]
	Delivery(#[from] DeliveryError),

	#[error(transparent)]
	Storage(#[from] StorageError),

	/// A caller-facing wait ran out. Nothing about the awaited entity
	/// changed; it may still settle later.
	#[error("Timed out after {waited:?} waiting for {id}")]
	BundleTimeout { id: String, waited: Duration },

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Lifecycle error: {0}")]
	Lifecycle(String),
}
