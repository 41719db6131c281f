//! HTTP API over the bundler engine.
//!
//! JSON in, JSON out. Errors are returned as [`ErrorResponse`] bodies with a
//! status code derived from the core error.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use bundler_config::ApiConfig;
use bundler_core::{BundlerEngine, CoreError, LifecycleState};
use bundler_registry::RegistryError;
use bundler_types::{
	u256_serde, Bundle, BundlerStats, CreateIntentRequest, ErrorResponse, ProtectionReport,
	SwapIntent, U256,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
	engine: Arc<BundlerEngine>,
}

/// Intent as returned to callers, with its advisory savings estimate.
#[derive(Debug, Serialize)]
pub struct IntentView {
	#[serde(flatten)]
	pub intent: SwapIntent,
	#[serde(with = "u256_serde")]
	pub estimated_savings: U256,
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
	pub timeout_ms: Option<u64>,
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
	Core(CoreError),
	NotFound(String),
}

impl From<CoreError> for ApiError {
	fn from(e: CoreError) -> Self {
		Self::Core(e)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, code, message) = match self {
			Self::NotFound(id) => (
				StatusCode::NOT_FOUND,
				"NOT_FOUND",
				format!("{} not found", id),
			),
			Self::Core(e) => {
				let (status, code) = match &e {
					CoreError::Registry(RegistryError::Validation(_)) => {
						(StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
					}
					CoreError::Registry(RegistryError::NotFound(_)) => {
						(StatusCode::NOT_FOUND, "NOT_FOUND")
					}
					CoreError::Registry(RegistryError::InvalidTransition { .. })
					| CoreError::Registry(RegistryError::ProofAlreadyAttached(_)) => {
						(StatusCode::CONFLICT, "INVALID_TRANSITION")
					}
					CoreError::BundleTimeout { .. } => {
						(StatusCode::GATEWAY_TIMEOUT, "BUNDLE_TIMEOUT")
					}
					CoreError::Quote(_) => (StatusCode::BAD_GATEWAY, "QUOTE_UNAVAILABLE"),
					_ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
				};
				if status.is_server_error() {
					warn!("Request failed: {}", e);
				}
				(status, code, e.to_string())
			}
		};

		let body = ErrorResponse {
			error: code.to_string(),
			message,
		};
		(status, Json(body)).into_response()
	}
}

/// Builds the router. Exposed separately from [`serve`] for tests.
pub fn router(engine: Arc<BundlerEngine>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/stats", get(stats))
		.route("/intents", post(create_intent))
		.route("/intents/pending", get(pending_intents))
		.route("/intents/{id}", get(get_intent).delete(cancel_intent))
		.route("/intents/{id}/wait", get(wait_for_intent))
		.route("/bundles/active", get(active_bundles))
		.route("/bundles/{id}", get(get_bundle))
		.route("/bundles/{id}/score", get(bundle_score))
		.with_state(AppState { engine })
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
}

/// Serves the API until `shutdown` resolves.
pub async fn serve(
	engine: Arc<BundlerEngine>,
	config: &ApiConfig,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
	let address = format!("{}:{}", config.host, config.port);
	let listener = tokio::net::TcpListener::bind(&address).await?;

	info!("API server listening on {}", address);

	axum::serve(listener, router(engine))
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}

fn view(engine: &BundlerEngine, intent: SwapIntent) -> IntentView {
	IntentView {
		estimated_savings: engine.estimated_savings(&intent),
		intent,
	}
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
	let lifecycle = state.engine.state().await;
	let status = if lifecycle == LifecycleState::Running {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};

	(
		status,
		Json(serde_json::json!({
			"status": lifecycle.to_string(),
			"name": state.engine.settings().name,
			"chainId": state.engine.settings().chain_id,
		})),
	)
}

async fn stats(State(state): State<AppState>) -> Json<BundlerStats> {
	Json(state.engine.stats())
}

async fn create_intent(
	State(state): State<AppState>,
	Json(request): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<IntentView>), ApiError> {
	let intent = state.engine.create_swap_intent(request).await?;
	Ok((StatusCode::ACCEPTED, Json(view(&state.engine, intent))))
}

async fn pending_intents(State(state): State<AppState>) -> Json<Vec<IntentView>> {
	let intents = state
		.engine
		.get_pending_intents()
		.into_iter()
		.map(|intent| view(&state.engine, intent))
		.collect();
	Json(intents)
}

async fn get_intent(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<IntentView>, ApiError> {
	match state.engine.get_intent(&id).await? {
		Some(intent) => Ok(Json(view(&state.engine, intent))),
		None => Err(ApiError::NotFound(id)),
	}
}

async fn cancel_intent(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<IntentView>, ApiError> {
	let intent = state.engine.cancel_intent(&id).await?;
	Ok(Json(view(&state.engine, intent)))
}

async fn wait_for_intent(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(params): Query<WaitParams>,
) -> Result<Json<IntentView>, ApiError> {
	let timeout = params.timeout_ms.map(Duration::from_millis);
	let intent = state.engine.wait_for_intent(&id, timeout).await?;
	Ok(Json(view(&state.engine, intent)))
}

async fn active_bundles(State(state): State<AppState>) -> Json<Vec<Bundle>> {
	Json(state.engine.get_active_bundles())
}

async fn get_bundle(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Bundle>, ApiError> {
	state
		.engine
		.get_bundle(&id)
		.await?
		.map(Json)
		.ok_or(ApiError::NotFound(id))
}

async fn bundle_score(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<ProtectionReport>, ApiError> {
	state
		.engine
		.protection_report(&id)
		.await?
		.map(Json)
		.ok_or(ApiError::NotFound(id))
}
