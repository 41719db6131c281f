//! Event bus implementation for inter-service communication.
//!
//! The scheduler and submitter publish every intent and bundle state change
//! here. Waiters and the HTTP layer subscribe instead of polling the
//! registry.

use bundler_types::BundlerEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Event bus for broadcasting bundler events to multiple subscribers.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<BundlerEvent>,
}

impl EventBus {
	/// Creates a new EventBus with the specified channel capacity.
	///
	/// Subscribers that fall more than `capacity` events behind observe a
	/// lag error and must re-read state from the registry.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	/// Creates a new subscriber. It sees every event published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<BundlerEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Having no subscribers is normal and not an error.
	pub fn publish(&self, event: BundlerEvent) {
		trace!(?event, "Publishing event");
		let _ = self.sender.send(event);
	}
}
