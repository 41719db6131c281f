//! Quote source boundary for the bundler.
//!
//! During bundle assembly the submitter needs, for every member, the swap
//! transaction that executes it. Where that data comes from is a
//! collaborator concern: any non-success answer is a hard failure for that
//! one intent.

use async_trait::async_trait;
use bundler_types::{ConfigSchema, Quote, QuoteRequest, SwapTransaction};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Re-export implementations
pub mod implementations {
	pub mod aggregator;
}

/// Errors that can occur while fetching quotes.
#[derive(Debug, Error)]
pub enum QuoteError {
	/// The source could not produce a quote for this request.
	#[error("Quote unavailable: {0}")]
	Unavailable(String),
	/// Transport-level failure talking to the source.
	#[error("HTTP error: {0}")]
	Http(String),
	/// The source answered with something that could not be parsed.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// Trait defining the interface for quote sources.
#[async_trait]
pub trait QuoteInterface: Send + Sync {
	/// Returns the configuration schema for this source.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Prices a swap.
	async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError>;

	/// Builds the transaction that executes a swap.
	async fn get_swap_transaction(
		&self,
		request: &QuoteRequest,
	) -> Result<SwapTransaction, QuoteError>;
}

/// Service that bounds every call to the quote source.
pub struct QuoteService {
	source: Box<dyn QuoteInterface>,
	timeout: Duration,
}

impl QuoteService {
	pub fn new(source: Box<dyn QuoteInterface>, timeout: Duration) -> Self {
		Self { source, timeout }
	}

	pub async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
		match tokio::time::timeout(self.timeout, self.source.get_quote(request)).await {
			Ok(result) => result,
			Err(_) => {
				warn!("Quote request timed out after {:?}", self.timeout);
				Err(QuoteError::Unavailable("quote timed out".into()))
			}
		}
	}

	pub async fn get_swap_transaction(
		&self,
		request: &QuoteRequest,
	) -> Result<SwapTransaction, QuoteError> {
		match tokio::time::timeout(self.timeout, self.source.get_swap_transaction(request)).await
		{
			Ok(result) => result,
			Err(_) => {
				warn!("Swap transaction request timed out after {:?}", self.timeout);
				Err(QuoteError::Unavailable("swap transaction timed out".into()))
			}
		}
	}
}
