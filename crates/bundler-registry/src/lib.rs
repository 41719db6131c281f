//! Intent registry and bundle store.
//!
//! Both hold their entities in concurrent maps and route every status change
//! through a single choke point that enforces the transition table. Nothing
//! outside this crate mutates an intent's status or a bundle's status.

use thiserror::Error;

pub mod bundles;
pub mod intents;

pub use bundles::BundleStore;
pub use intents::IntentRegistry;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// Malformed intent input; the intent never enters the registry.
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Not found: {0}")]
	NotFound(String),
	/// A transition the state machine does not permit.
	#[error("Invalid transition for {id}: {from} -> {to}")]
	InvalidTransition {
		id: String,
		from: String,
		to: String,
	},
	/// The intent already carries a fair-ordering proof.
	#[error("Proof already attached to {0}")]
	ProofAlreadyAttached(String),
}
