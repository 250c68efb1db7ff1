mod config;
mod records;
mod relay;
mod session;
mod vault_routes;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tv_chain_client::{NetworkConfig, VaultContracts, WalletProvider};
use tv_chain_evm::{EvmContracts, HttpProvider};
use tv_storage::{RocksDbStore, Storage, TransactionHistory};
use tv_wallet_core::{EventBus, ToastCenter, VaultSync, WalletConnector};

use crate::config::ServiceConfig;

const SERVICE_NAME: &str = "vault-service";

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

pub(crate) struct AppState {
    pub connector: Arc<WalletConnector>,
    pub vault: Arc<VaultSync>,
    pub toasts: ToastCenter,
    pub storage: Storage,
    pub history: TransactionHistory,
    pub events: EventBus,
}

impl AppState {
    pub fn new(
        network: NetworkConfig,
        provider: Option<Arc<dyn WalletProvider>>,
        contracts: Arc<dyn VaultContracts>,
        storage: Storage,
    ) -> Self {
        let events = EventBus::default();
        let connector = WalletConnector::new(provider, network, events.clone());
        let vault = VaultSync::new(contracts, events.clone()).with_storage(storage.clone());

        Self {
            connector: Arc::new(connector),
            vault: Arc::new(vault),
            toasts: ToastCenter::default(),
            history: TransactionHistory::new(storage.clone()),
            storage,
            events,
        }
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/session", get(session::get_session))
        .route("/session/connect", post(session::connect))
        .route("/session/disconnect", post(session::disconnect))
        .route("/session/switch", post(session::switch_network))
        .route("/vault", get(vault_routes::get_vault))
        .route("/vault/preview", get(vault_routes::preview))
        .route("/vault/refresh", post(vault_routes::refresh))
        .route("/vault/deposit", post(vault_routes::deposit))
        .route("/vault/withdraw", post(vault_routes::withdraw))
        .route("/vault/emergency-withdraw", post(vault_routes::emergency_withdraw))
        .route("/history", get(records::history))
        .route("/toasts", get(records::toasts))
        .route("/toasts/{id}", delete(records::dismiss_toast))
        .route("/preferences", get(records::get_preferences).post(records::update_preferences))
        .route("/lock-options", get(records::lock_options))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;
    info!("target network {} ({})", config.network.name, config.network.chain_id.to_hex());

    let storage = match &config.store_path {
        Some(path) => Storage::new(Arc::new(RocksDbStore::open_default(path)?)),
        None => Storage::in_memory(),
    };
    if !storage.is_available().await {
        anyhow::bail!("storage is not writable");
    }

    let http_provider = config.rpc_url.as_deref().map(|url| Arc::new(HttpProvider::new(url)));
    let watcher = http_provider
        .as_ref()
        .map(|provider| provider.spawn_watcher(config.poll_interval));

    // Reads still need a node when no wallet provider is configured.
    let read_provider: Arc<dyn WalletProvider> = match &http_provider {
        Some(provider) => provider.clone(),
        None => Arc::new(HttpProvider::new(config.network.rpc_url)),
    };
    let contracts = EvmContracts::new(read_provider, config.contracts.clone());

    let state = Arc::new(AppState::new(
        *config.network,
        http_provider.map(|provider| provider as Arc<dyn WalletProvider>),
        Arc::new(contracts),
        storage,
    ));

    let listener_task = state.connector.spawn_listener();
    let relay_task = relay::spawn(state.clone());

    let app = router(state);
    let addr = config.bind_addr;
    info!("{SERVICE_NAME} listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    relay_task.abort();
    for task in [watcher, listener_task].into_iter().flatten() {
        task.abort();
    }

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: SERVICE_NAME,
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    error(StatusCode::BAD_REQUEST, message)
}

pub(crate) fn unauthorized(message: impl Into<String>) -> ApiError {
    error(StatusCode::UNAUTHORIZED, message)
}

pub(crate) fn not_found(message: impl Into<String>) -> ApiError {
    error(StatusCode::NOT_FOUND, message)
}

pub(crate) fn conflict(message: impl Into<String>) -> ApiError {
    error(StatusCode::CONFLICT, message)
}

pub(crate) fn upstream_error(message: impl Into<String>) -> ApiError {
    error(StatusCode::BAD_GATEWAY, message)
}

pub(crate) fn unavailable(message: impl Into<String>) -> ApiError {
    error(StatusCode::SERVICE_UNAVAILABLE, message)
}

pub(crate) fn internal_error(err: impl std::fmt::Display) -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use tv_api_types::ChainId;

    #[tokio::test]
    async fn health_and_version() {
        let harness = Harness::new(ChainId(8453));

        let (status, body) = harness.call("GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], SERVICE_NAME);
        assert_eq!(body["status"], "ok");

        let (_, body) = harness.call("GET", "/version", None).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn preferences_survive_restart_with_rocksdb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        let path = path.to_str().unwrap();

        {
            let storage = Storage::new(Arc::new(RocksDbStore::open_default(path).unwrap()));
            assert!(storage.is_available().await);
            let state = AppState::new(
                tv_chain_client::BASE_MAINNET,
                None,
                tv_wallet_core::testing::MockContracts::new(),
                storage,
            );
            let app = router(Arc::new(state));
            let request = axum::http::Request::builder()
                .method("POST")
                .uri("/preferences")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(r#"{"theme":"light"}"#))
                .unwrap();
            let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let storage = Storage::new(Arc::new(RocksDbStore::open_default(path).unwrap()));
        assert_eq!(storage.preferences().await.theme, "light");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let harness = Harness::new(ChainId(8453));
        let (status, _) = harness.call("GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
