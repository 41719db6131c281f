//! File-based storage backend.
//!
//! Each key is one file under the base directory. The first eight bytes of a
//! file hold the expiry instant (milliseconds since the Unix epoch, zero for
//! none); the value follows.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use bundler_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::debug;

const HEADER_LEN: usize = 8;

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or_default()
}

fn backend_err(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("storage_path", FieldType::String)]).validate(config)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		let mut data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			}
			Err(e) => return Err(backend_err(e)),
		};

		if data.len() < HEADER_LEN {
			return Err(StorageError::Backend(format!(
				"Corrupt storage file {:?}",
				path
			)));
		}

		let mut header = [0u8; HEADER_LEN];
		header.copy_from_slice(&data[..HEADER_LEN]);
		let expires_at = u64::from_be_bytes(header);
		if expires_at != 0 && expires_at <= now_ms() {
			debug!("Storage key {} expired", key);
			match fs::remove_file(&path).await {
				Ok(_) => {}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => return Err(backend_err(e)),
			}
			return Err(StorageError::NotFound);
		}

		Ok(data.split_off(HEADER_LEN))
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend_err)?;
		}

		let expires_at = ttl
			.map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64))
			.unwrap_or(0);
		let mut contents = Vec::with_capacity(HEADER_LEN + value.len());
		contents.extend_from_slice(&expires_at.to_be_bytes());
		contents.extend_from_slice(&value);

		// Write to a temp file then rename so readers never see a partial value
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, contents).await.map_err(backend_err)?;
		fs::rename(&temp_path, &path).await.map_err(backend_err)?;

		Ok(())
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/archive")
pub fn create_storage(config: &toml::Value) -> Box<dyn StorageInterface> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/archive")
		.to_string();

	Box::new(FileStorage::new(PathBuf::from(storage_path)))
}
