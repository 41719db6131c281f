//! Configuration validation utility
//!
//! Usage: cargo run --bin validate-config config/example.toml

use std::env;
use std::process;

use bundler_config::ConfigLoader;

fn main() {
	let args: Vec<String> = env::args().collect();

	if args.len() != 2 {
		eprintln!("Usage: {} <config-file>", args[0]);
		process::exit(1);
	}

	let config_path = &args[1];

	println!("Validating configuration file: {}", config_path);

	match ConfigLoader::new().with_file(config_path).load() {
		Ok(config) => {
			let settings = &config.bundler;
			println!("Configuration is valid");
			println!("Bundler name: {}", settings.name);
			println!("Chain: {}", settings.chain_id);
			println!(
				"Bundles: max {} intents, close after {}ms",
				settings.bundle_max_size, settings.bundle_timeout_ms
			);
			println!("Storage backend: {}", config.storage.implementation);
			println!("Proof backend: {}", config.proof.implementation);
			println!("Quote provider: {}", config.quote.implementation);
			println!("Delivery provider: {}", config.delivery.implementation);
		}
		Err(e) => {
			eprintln!("Configuration validation failed:");
			eprintln!("{}", e);
			process::exit(1);
		}
	}
}
