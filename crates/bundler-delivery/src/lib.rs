//! Chain submission boundary for the bundler.
//!
//! A closed bundle leaves the core as one [`OperationBundle`]: an ordered list
//! of swap calls that must execute atomically. The delivery backend submits
//! it and later reports whether it landed.

use async_trait::async_trait;
use bundler_types::{ConfigSchema, Confirmation, OperationBundle, TransactionHash};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Re-export implementations
pub mod implementations {
	pub mod rpc;
}

/// Errors that can occur during bundle delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// The atomic call could not be submitted (signing, node rejection).
	#[error("Submission failed: {0}")]
	Submission(String),
	/// A receipt came back but could not be read.
	#[error("Confirmation failed: {0}")]
	Confirmation(String),
	/// No outcome was observed within the bound.
	#[error("No confirmation after {0:?}")]
	ConfirmationTimeout(Duration),
	#[error("Network error: {0}")]
	Network(String),
}

/// Trait defining the interface for chain submission backends.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Submits the ordered operations as one atomic call.
	async fn submit_bundle(&self, bundle: &OperationBundle)
		-> Result<TransactionHash, DeliveryError>;

	/// Resolves once the submitted call has been mined.
	async fn wait_for_confirmation(
		&self,
		tx_hash: &TransactionHash,
	) -> Result<Confirmation, DeliveryError>;
}

/// Service that submits bundles and bounds the confirmation wait.
pub struct DeliveryService {
	backend: Box<dyn DeliveryInterface>,
	confirmation_timeout: Duration,
}

impl DeliveryService {
	pub fn new(backend: Box<dyn DeliveryInterface>, confirmation_timeout: Duration) -> Self {
		Self {
			backend,
			confirmation_timeout,
		}
	}

	/// Submits a bundle. Attempted once; callers never retry automatically.
	pub async fn submit(&self, bundle: &OperationBundle) -> Result<TransactionHash, DeliveryError> {
		if bundle.operations.is_empty() {
			return Err(DeliveryError::Submission("bundle has no operations".into()));
		}

		let tx_hash = self.backend.submit_bundle(bundle).await?;
		info!(
			bundle_id = %bundle.bundle_id,
			tx_hash = %truncate_hash(&tx_hash),
			operations = bundle.operations.len(),
			"Submitted bundle"
		);
		Ok(tx_hash)
	}

	/// Waits for the outcome of a submitted bundle, up to the configured bound.
	pub async fn confirm(&self, tx_hash: &TransactionHash) -> Result<Confirmation, DeliveryError> {
		match tokio::time::timeout(
			self.confirmation_timeout,
			self.backend.wait_for_confirmation(tx_hash),
		)
		.await
		{
			Ok(result) => result,
			Err(_) => {
				warn!(
					tx_hash = %truncate_hash(tx_hash),
					"No confirmation after {:?}", self.confirmation_timeout
				);
				Err(DeliveryError::ConfirmationTimeout(self.confirmation_timeout))
			}
		}
	}
}

/// Shortens a transaction hash for log output.
pub fn truncate_hash(hash: &TransactionHash) -> String {
	let hash_str = hex::encode(hash.as_slice());
	format!("0x{}..", &hash_str[..8])
}
