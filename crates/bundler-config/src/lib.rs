//! Configuration for the fair-ordering bundler.
//!
//! The configuration is structured (not flags): a `[bundler]` section with the
//! batching and timeout knobs, plus one section per pluggable backend whose
//! free-form `config` table is validated by that backend's own schema.

use thiserror::Error;

pub mod loader;
pub mod types;

pub use loader::{substitute_env_vars, validate_config, ConfigLoader};
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),
}
