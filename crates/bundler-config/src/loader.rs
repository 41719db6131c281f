//! Configuration loading from files and environment.

use crate::{types::BundlerConfig, ConfigError};
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration loader with environment variable substitution
#[derive(Debug, Clone)]
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "BUNDLER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Loads, overrides and validates the configuration.
	pub fn load(&self) -> Result<BundlerConfig, ConfigError> {
		let path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {:?}", path);

		let content = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
		let content = substitute_env_vars(&content)?;

		let mut config = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&content)?,
			Some("json") => Self::from_json(&content)?,
			Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
			other => {
				return Err(ConfigError::ParseError(format!(
					"Unsupported config format: {:?}",
					other
				)))
			}
		};

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	/// Load from TOML string
	pub fn from_toml(contents: &str) -> Result<BundlerConfig, ConfigError> {
		toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	/// Load from JSON string
	pub fn from_json(contents: &str) -> Result<BundlerConfig, ConfigError> {
		serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	/// Load from YAML string
	pub fn from_yaml(contents: &str) -> Result<BundlerConfig, ConfigError> {
		serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn env_var(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut BundlerConfig) -> Result<(), ConfigError> {
		if let Some(port) = self.env_var("API_PORT") {
			debug!("Overriding API port from environment");
			config.api.port = parse_override("API_PORT", &port)?;
		}

		if let Some(size) = self.env_var("BUNDLE_MAX_SIZE") {
			debug!("Overriding bundle max size from environment");
			config.bundler.bundle_max_size = parse_override("BUNDLE_MAX_SIZE", &size)?;
		}

		if let Some(timeout) = self.env_var("BUNDLE_TIMEOUT_MS") {
			debug!("Overriding bundle timeout from environment");
			config.bundler.bundle_timeout_ms = parse_override("BUNDLE_TIMEOUT_MS", &timeout)?;
		}

		Ok(())
	}
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
	T::Err: std::fmt::Display,
{
	value
		.parse()
		.map_err(|e| ConfigError::ValidationError(format!("Invalid {}: {}", name, e)))
}

/// Replaces `${VAR_NAME}` placeholders with environment values.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let var_name = &cap[1];
		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
		result = result.replace(&cap[0], &env_value);
	}

	Ok(result)
}

/// Checks the cross-field constraints serde cannot express.
pub fn validate_config(config: &BundlerConfig) -> Result<(), ConfigError> {
	let settings = &config.bundler;

	if settings.bundle_max_size == 0 {
		return Err(ConfigError::ValidationError(
			"bundle_max_size must be at least 1".to_string(),
		));
	}

	let timeouts = [
		("bundle_timeout_ms", settings.bundle_timeout_ms),
		("proof_freshness_ms", settings.proof_freshness_ms),
		("submission_timeout_ms", settings.submission_timeout_ms),
		("tick_interval_ms", settings.tick_interval_ms),
		("proof_timeout_ms", settings.proof_timeout_ms),
		("quote_timeout_ms", settings.quote_timeout_ms),
		("intent_deadline_ms", settings.intent_deadline_ms),
	];
	if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
		return Err(ConfigError::ValidationError(format!(
			"{} must be greater than zero",
			name
		)));
	}

	if settings.tick_interval_ms > settings.bundle_timeout_ms {
		return Err(ConfigError::ValidationError(format!(
			"tick_interval_ms ({}) must not exceed bundle_timeout_ms ({})",
			settings.tick_interval_ms, settings.bundle_timeout_ms
		)));
	}

	if settings.event_capacity == 0 {
		return Err(ConfigError::ValidationError(
			"event_capacity must be at least 1".to_string(),
		));
	}

	for (section, backend) in [
		("storage", &config.storage),
		("proof", &config.proof),
		("quote", &config.quote),
		("delivery", &config.delivery),
	] {
		if backend.implementation.trim().is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"[{}] must name an implementation",
				section
			)));
		}
	}

	Ok(())
}
