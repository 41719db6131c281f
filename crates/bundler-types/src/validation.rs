//! Configuration validation for pluggable backends.
//!
//! Proof, quote, delivery and storage backends each receive a free-form TOML
//! table. They publish a [`ConfigSchema`] describing that table so the engine
//! builder can reject a bad configuration before anything starts.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// A 0x-prefixed, 20-byte hex address.
	Address,
	/// An http(s) URL.
	Url,
}

/// A field definition with name and type.
#[derive(Debug)]
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}
}

/// Schema definition with required and optional fields.
#[derive(Debug, Default)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			validate_field(&field.name, value, &field.field_type)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				validate_field(&field.name, value, &field.field_type)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
	ValidationError::InvalidValue {
		field: field.to_string(),
		message: message.into(),
	}
}

fn validate_field(
	name: &str,
	value: &toml::Value,
	field_type: &FieldType,
) -> Result<(), ValidationError> {
	match field_type {
		FieldType::String => {
			value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
		}
		FieldType::Boolean => {
			value.as_bool().ok_or_else(|| mismatch(name, "boolean", value))?;
		}
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(name, "integer", value))?;

			if let Some(min) = min.filter(|min| int_val < *min) {
				return Err(invalid(
					name,
					format!("Value {} is less than minimum {}", int_val, min),
				));
			}
			if let Some(max) = max.filter(|max| int_val > *max) {
				return Err(invalid(
					name,
					format!("Value {} is greater than maximum {}", int_val, max),
				));
			}
		}
		FieldType::Address => {
			let s = value.as_str().ok_or_else(|| mismatch(name, "address", value))?;
			let hex = s
				.strip_prefix("0x")
				.ok_or_else(|| invalid(name, "Address must start with 0x"))?;
			if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
				return Err(invalid(name, "Address must be 20 hex-encoded bytes"));
			}
		}
		FieldType::Url => {
			let s = value.as_str().ok_or_else(|| mismatch(name, "url", value))?;
			if !(s.starts_with("http://") || s.starts_with("https://")) {
				return Err(invalid(name, "URL must use http or https"));
			}
		}
	}

	Ok(())
}

/// Trait defining a configuration schema that can validate TOML values.
pub trait ConfigSchema: Send + Sync {
	/// Validates a TOML configuration value against this schema.
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

/// Schema for backends that take no configuration.
pub struct EmptySchema;

impl ConfigSchema for EmptySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::default().validate(config)
	}
}
