//! Backends shipped with the service, registered by the names the
//! configuration refers to.

use bundler_config::BundlerConfig;
use bundler_core::BundlerBuilder;
use bundler_delivery::implementations::rpc;
use bundler_proof::implementations::commitment;
use bundler_quote::implementations::aggregator;
use bundler_storage::implementations::{file, memory};

/// Returns a builder with every shipped backend registered.
pub fn builder(config: BundlerConfig) -> BundlerBuilder {
	BundlerBuilder::new(config)
		.with_storage_factory("memory", memory::create_storage)
		.with_storage_factory("file", file::create_storage)
		.with_proof_factory("commitment", commitment::create_proof_backend)
		.with_quote_factory("aggregator", aggregator::create_quote_source)
		.with_delivery_factory("rpc", rpc::create_delivery)
}
