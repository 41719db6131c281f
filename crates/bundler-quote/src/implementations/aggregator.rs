//! HTTP client for a DEX aggregator API.
//!
//! Speaks the `/{chain_id}/quote` and `/{chain_id}/swap` endpoints used by
//! the common aggregator APIs. Amounts travel as decimal strings and
//! slippage as a percentage.

use crate::{QuoteError, QuoteInterface};
use async_trait::async_trait;
use bundler_types::{
	Address, Bytes, ConfigSchema, Field, FieldType, Quote, QuoteRequest, Schema, SwapTransaction,
	ValidationError, U256,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
	dst_amount: String,
	#[serde(default)]
	gas: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
	#[allow(dead_code)]
	dst_amount: String,
	tx: TxResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxResponse {
	to: String,
	data: String,
	value: String,
	#[serde(default)]
	gas: u64,
	#[serde(default)]
	gas_price: Option<String>,
}

/// Aggregator-backed quote source.
pub struct AggregatorQuoteSource {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl AggregatorQuoteSource {
	pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key,
		}
	}

	async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, String)],
	) -> Result<T, QuoteError> {
		let url = format!("{}/{}", self.base_url, path);
		debug!("GET {}", url);

		let mut request = self.client.get(&url).query(query);
		if let Some(key) = &self.api_key {
			request = request.bearer_auth(key);
		}

		let response = request
			.send()
			.await
			.map_err(|e| QuoteError::Http(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(QuoteError::Unavailable(format!("{}: {}", status, body)));
		}

		response
			.json::<T>()
			.await
			.map_err(|e| QuoteError::InvalidResponse(e.to_string()))
	}
}

fn base_query(request: &QuoteRequest) -> Vec<(&'static str, String)> {
	vec![
		("src", request.from_token.to_string()),
		("dst", request.to_token.to_string()),
		("amount", request.amount.to_string()),
	]
}

/// Aggregators take slippage as a percentage.
fn slippage_percent(bps: u16) -> String {
	format!("{}", f64::from(bps) / 100.0)
}

fn parse<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, QuoteError>
where
	T::Err: std::fmt::Display,
{
	value
		.parse::<T>()
		.map_err(|e| QuoteError::InvalidResponse(format!("{} '{}': {}", field, value, e)))
}

/// Configuration schema for AggregatorQuoteSource.
pub struct AggregatorSchema;

impl ConfigSchema for AggregatorSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![Field::new("base_url", FieldType::Url)],
			// Optional fields
			vec![Field::new("api_key", FieldType::String)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl QuoteInterface for AggregatorQuoteSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AggregatorSchema)
	}

	async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
		let mut query = base_query(request);
		query.push(("includeGas", "true".to_string()));

		let response: QuoteResponse = self
			.get_json(&format!("{}/quote", request.chain_id), &query)
			.await?;

		Ok(Quote {
			to_amount: parse::<U256>("dstAmount", &response.dst_amount)?,
			estimated_gas: response.gas.unwrap_or_default(),
			tx_data: None,
		})
	}

	async fn get_swap_transaction(
		&self,
		request: &QuoteRequest,
	) -> Result<SwapTransaction, QuoteError> {
		let mut query = base_query(request);
		query.push(("from", request.from.to_string()));
		query.push(("slippage", slippage_percent(request.slippage_bps)));
		query.push(("disableEstimate", "true".to_string()));

		let response: SwapResponse = self
			.get_json(&format!("{}/swap", request.chain_id), &query)
			.await?;
		let tx = response.tx;

		Ok(SwapTransaction {
			to: parse::<Address>("tx.to", &tx.to)?,
			data: parse::<Bytes>("tx.data", &tx.data)?,
			value: parse::<U256>("tx.value", &tx.value)?,
			gas: tx.gas,
			gas_price: match tx.gas_price {
				Some(price) => parse::<U256>("tx.gasPrice", &price)?,
				None => U256::ZERO,
			},
		})
	}
}

/// Factory function to create the aggregator quote source from configuration.
///
/// Configuration parameters:
/// - `base_url`: Aggregator API root, e.g. "https://api.1inch.dev/swap/v6.0"
/// - `api_key`: Optional bearer token
pub fn create_quote_source(config: &toml::Value) -> Box<dyn QuoteInterface> {
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or("https://api.1inch.dev/swap/v6.0")
		.to_string();

	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.filter(|key| !key.is_empty())
		.map(str::to_string);

	Box::new(AggregatorQuoteSource::new(base_url, api_key))
}
