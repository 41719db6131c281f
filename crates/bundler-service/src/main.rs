use anyhow::{Context, Result};
use bundler_config::ConfigLoader;
use bundler_service::{api, backends};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bundler-service")]
#[command(about = "Fair-ordering swap bundler", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(
		short,
		long,
		value_name = "FILE",
		default_value = "config/example.toml",
		global = true
	)]
	config: PathBuf,

	#[arg(long, env = "BUNDLER_LOG_LEVEL", default_value = "info", global = true)]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the bundler service
	Start,
	/// Validate the configuration file and backend settings
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level);

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli),
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.context("Failed to load configuration")?;

	let engine = backends::builder(config.clone())
		.build()
		.context("Failed to build bundler engine")?;
	let engine = Arc::new(engine);

	engine
		.start()
		.await
		.context("Failed to start bundler engine")?;

	info!(
		name = %config.bundler.name,
		chain_id = config.bundler.chain_id,
		"Bundler service started"
	);

	api::serve(engine.clone(), &config.api, shutdown_signal())
		.await
		.context("API server failed")?;

	info!("Shutdown signal received, stopping services...");

	engine
		.shutdown()
		.await
		.context("Failed to shut down bundler engine")?;

	info!("Bundler service stopped");
	Ok(())
}

fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.context("Failed to load configuration")?;

	// Building checks every backend section against its schema.
	backends::builder(config.clone())
		.build()
		.context("Invalid backend configuration")?;

	let settings = &config.bundler;
	info!("Configuration is valid");
	info!("Bundler name: {}", settings.name);
	info!(
		"Bundles: max {} intents, close after {}ms on chain {}",
		settings.bundle_max_size, settings.bundle_timeout_ms, settings.chain_id
	);
	info!("Storage: {}", config.storage.implementation);
	info!("Proof: {}", config.proof.implementation);
	info!("Quote: {}", config.quote.implementation);
	info!("Delivery: {}", config.delivery.implementation);

	Ok(())
}

fn setup_tracing(log_level: &str) {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
