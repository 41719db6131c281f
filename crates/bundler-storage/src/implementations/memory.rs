//! In-memory storage backend.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use bundler_types::{ConfigSchema, EmptySchema};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.map_or(true, |at| at > now)
	}
}

/// Storage that lives and dies with the process.
#[derive(Default)]
pub struct MemoryStorage {
	entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EmptySchema)
	}

	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let now = Instant::now();
		{
			let entries = self.entries.read().await;
			match entries.get(key) {
				Some(entry) if entry.is_live(now) => return Ok(entry.value.clone()),
				Some(_) => {}
				None => return Err(StorageError::NotFound),
			}
		}

		// Expired: drop it
		self.entries.write().await.remove(key);
		Err(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let entry = Entry {
			value,
			expires_at: ttl.map(|ttl| Instant::now() + ttl),
		};
		self.entries.write().await.insert(key.to_string(), entry);
		Ok(())
	}
}

/// Factory function to create an in-memory storage backend. Takes no settings.
pub fn create_storage(_config: &toml::Value) -> Box<dyn StorageInterface> {
	Box::new(MemoryStorage::new())
}
