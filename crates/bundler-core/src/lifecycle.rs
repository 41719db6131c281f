//! Engine lifecycle.
//!
//! An engine is started once and stopped once:
//! `uninitialized -> starting -> running -> stopping -> stopped`. The tick
//! task listens on the shutdown channel and exits when it fires.

use crate::error::CoreError;
use std::fmt;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Uninitialized,
	Starting,
	Running,
	Stopping,
	Stopped,
}

impl LifecycleState {
	/// The only state reachable from this one, if any.
	fn next(self) -> Option<Self> {
		match self {
			Self::Uninitialized => Some(Self::Starting),
			Self::Starting => Some(Self::Running),
			Self::Running => Some(Self::Stopping),
			Self::Stopping => Some(Self::Stopped),
			Self::Stopped => None,
		}
	}
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Uninitialized => "uninitialized",
			Self::Starting => "starting",
			Self::Running => "running",
			Self::Stopping => "stopping",
			Self::Stopped => "stopped",
		};
		f.write_str(name)
	}
}

pub struct LifecycleManager {
	state: RwLock<LifecycleState>,
	shutdown_tx: broadcast::Sender<()>,
}

impl LifecycleManager {
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);

		Self {
			state: RwLock::new(LifecycleState::Uninitialized),
			shutdown_tx,
		}
	}

	pub async fn state(&self) -> LifecycleState {
		*self.state.read().await
	}

	/// Claims the engine for starting. Fails if it was ever started.
	pub async fn begin_start(&self) -> Result<(), CoreError> {
		self.advance(LifecycleState::Starting).await
	}

	/// Marks the background tasks as spawned.
	pub async fn finish_start(&self) -> Result<(), CoreError> {
		self.advance(LifecycleState::Running).await
	}

	/// Signals every shutdown subscriber and settles in `stopped`.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		self.advance(LifecycleState::Stopping).await?;
		// No receivers just means nothing was listening.
		let _ = self.shutdown_tx.send(());
		self.advance(LifecycleState::Stopped).await
	}

	pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
		self.shutdown_tx.subscribe()
	}

	async fn advance(&self, to: LifecycleState) -> Result<(), CoreError> {
		let mut state = self.state.write().await;
		let from = *state;

		if from.next() != Some(to) {
			return Err(CoreError::Lifecycle(format!(
				"engine cannot go from {} to {}",
				from, to
			)));
		}

		*state = to;
		info!("Engine {}", to);
		Ok(())
	}
}

impl Default for LifecycleManager {
	fn default() -> Self {
		Self::new()
	}
}
