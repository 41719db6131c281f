//! JSON-RPC delivery through a smart account.
//!
//! The ordered operations are ABI-encoded into a single
//! `executeBatch(address[],uint256[],bytes[])` call on the configured smart
//! account, sent with `eth_sendTransaction`, and confirmed by polling
//! `eth_getTransactionReceipt`. Signing is left to the node.

use crate::{truncate_hash, DeliveryError, DeliveryInterface};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use bundler_types::{
	ConfigSchema, Confirmation, Field, FieldType, OperationBundle, Schema, TransactionHash,
	ValidationError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

// Smart-account batch entry point.
sol! {
	function executeBatch(address[] dest, uint256[] value, bytes[] func) external;
}

/// Gas added on top of the member operations for the outer call.
const BATCH_OVERHEAD_GAS: u64 = 50_000;

#[derive(Debug, Deserialize)]
struct RpcResponse {
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
	code: i64,
	message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
	status: String,
	block_number: Option<String>,
	gas_used: Option<String>,
}

/// Encodes the ordered operations as one `executeBatch` call.
pub fn encode_batch(bundle: &OperationBundle) -> Bytes {
	let call = executeBatchCall {
		dest: bundle.operations.iter().map(|op| op.to).collect(),
		value: bundle.operations.iter().map(|op| op.value).collect(),
		func: bundle.operations.iter().map(|op| op.data.clone()).collect(),
	};
	Bytes::from(call.abi_encode())
}

fn parse_quantity(field: &str, value: &str) -> Result<u64, DeliveryError> {
	u64::from_str_radix(value.trim_start_matches("0x"), 16)
		.map_err(|e| DeliveryError::Confirmation(format!("bad {} '{}': {}", field, value, e)))
}

/// JSON-RPC delivery backend.
pub struct RpcDelivery {
	client: reqwest::Client,
	rpc_url: String,
	smart_account: Address,
	/// Sender of the outer transaction.
	from: Address,
	poll_interval: Duration,
	request_id: AtomicU64,
}

impl RpcDelivery {
	pub fn new(
		rpc_url: impl Into<String>,
		smart_account: Address,
		from: Address,
		poll_interval: Duration,
	) -> Self {
		Self {
			client: reqwest::Client::new(),
			rpc_url: rpc_url.into(),
			smart_account,
			from,
			poll_interval,
			request_id: AtomicU64::new(1),
		}
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value, DeliveryError> {
		let body = json!({
			"jsonrpc": "2.0",
			"id": self.request_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": params,
		});

		let response = self
			.client
			.post(&self.rpc_url)
			.json(&body)
			.send()
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))?;

		if !response.status().is_success() {
			return Err(DeliveryError::Network(format!(
				"{} returned {}",
				method,
				response.status()
			)));
		}

		let response: RpcResponse = response
			.json()
			.await
			.map_err(|e| DeliveryError::Network(format!("malformed response: {}", e)))?;

		match (response.result, response.error) {
			(_, Some(error)) => Err(DeliveryError::Submission(format!(
				"{} failed ({}): {}",
				method, error.code, error.message
			))),
			(Some(result), None) => Ok(result),
			(None, None) => Ok(Value::Null),
		}
	}
}

/// Configuration schema for RpcDelivery.
pub struct RpcDeliverySchema;

impl ConfigSchema for RpcDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new("rpc_url", FieldType::Url),
				Field::new("smart_account", FieldType::Address),
			],
			// Optional fields
			vec![
				Field::new("from", FieldType::Address),
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(10),
						max: Some(60_000),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl DeliveryInterface for RpcDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RpcDeliverySchema)
	}

	async fn submit_bundle(
		&self,
		bundle: &OperationBundle,
	) -> Result<TransactionHash, DeliveryError> {
		let data = encode_batch(bundle);
		let value = bundle
			.operations
			.iter()
			.fold(U256::ZERO, |acc, op| acc.saturating_add(op.value));
		let gas = bundle.total_gas().saturating_add(BATCH_OVERHEAD_GAS);

		let tx = json!({
			"from": self.from,
			"to": self.smart_account,
			"data": data,
			"value": value,
			"gas": format!("{:#x}", gas),
		});

		let result = self.call("eth_sendTransaction", json!([tx])).await?;
		let hash = result
			.as_str()
			.ok_or_else(|| DeliveryError::Submission("missing transaction hash".into()))?;

		hash.parse::<TransactionHash>()
			.map_err(|e| DeliveryError::Submission(format!("bad transaction hash: {}", e)))
	}

	async fn wait_for_confirmation(
		&self,
		tx_hash: &TransactionHash,
	) -> Result<Confirmation, DeliveryError> {
		let mut attempts = 0u64;

		loop {
			attempts += 1;
			// Node errors while polling say nothing about the transaction.
			let result = match self
				.call("eth_getTransactionReceipt", json!([tx_hash]))
				.await
			{
				Ok(result) => result,
				Err(e) => {
					warn!(
						"Receipt poll for {} failed (attempt {}): {}",
						truncate_hash(tx_hash),
						attempts,
						e
					);
					tokio::time::sleep(self.poll_interval).await;
					continue;
				}
			};

			if result.is_null() {
				debug!(
					"Transaction {} not yet mined (attempt {})",
					truncate_hash(tx_hash),
					attempts
				);
				tokio::time::sleep(self.poll_interval).await;
				continue;
			}

			let receipt: ReceiptResponse = serde_json::from_value(result)
				.map_err(|e| DeliveryError::Confirmation(format!("malformed receipt: {}", e)))?;

			let block_number = receipt
				.block_number
				.as_deref()
				.map(|n| parse_quantity("blockNumber", n))
				.transpose()?;
			let gas_used = receipt
				.gas_used
				.as_deref()
				.map(|g| parse_quantity("gasUsed", g))
				.transpose()?;

			return Ok(Confirmation {
				tx_hash: *tx_hash,
				success: parse_quantity("status", &receipt.status)? == 1,
				block_number,
				gas_used,
			});
		}
	}
}

/// Factory function to create the RPC delivery backend from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: JSON-RPC endpoint of a node that can sign for `from`
/// - `smart_account`: Account exposing `executeBatch`
/// - `from`: Sender of the outer call (default: `smart_account`)
/// - `poll_interval_ms`: Receipt polling interval (default: 1000)
pub fn create_delivery(config: &toml::Value) -> Box<dyn DeliveryInterface> {
	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.unwrap_or("http://localhost:8545")
		.to_string();

	let smart_account = config
		.get("smart_account")
		.and_then(|v| v.as_str())
		.and_then(|s| s.parse::<Address>().ok())
		.unwrap_or_default();

	let from = config
		.get("from")
		.and_then(|v| v.as_str())
		.and_then(|s| s.parse::<Address>().ok())
		.unwrap_or(smart_account);

	let poll_interval_ms = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.and_then(|v| u64::try_from(v).ok())
		.unwrap_or(1000);

	Box::new(RpcDelivery::new(
		rpc_url,
		smart_account,
		from,
		Duration::from_millis(poll_interval_ms),
	))
}
