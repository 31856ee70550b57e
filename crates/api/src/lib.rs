//! HTTP API server for the order fulfillment orchestrator.
//!
//! Provides REST endpoints for placing and updating orders and for reading
//! the ledgers behind them, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use fulfillment::{
    CarrierClient, CarrierError, FulfillmentContext, FulfillmentSettings, HttpCarrierClient,
    LoginTokenProvider, Notifier, OrderOrchestrator, StaticTokenProvider, TokenProvider,
    TracingCarrier, TracingNotifier,
};
use ledger_store::{
    CommissionSettings, InMemoryLedgerStore, LedgerError, LedgerStore, PostgresLedgerStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{CarrierAuth, Config};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: OrderOrchestrator,
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Ledger store error: {0}")]
    Store(#[from] LedgerError),

    #[error("Carrier client error: {0}")]
    Carrier(#[from] CarrierError),
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/orders",
            get(routes::orders::list).post(routes::orders::create),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get).patch(routes::orders::update),
        )
        .route("/orders/{id}/history", get(routes::orders::history))
        .route("/orders/{id}/shipment", get(routes::orders::shipment))
        .route("/users/{id}/coins", get(routes::users::coins))
        .route(
            "/courier/serviceability",
            get(routes::courier::serviceability),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Assembles the application state from its collaborators.
pub fn create_state(
    store: Arc<dyn LedgerStore>,
    commission: Arc<dyn CommissionSettings>,
    carrier: Arc<dyn CarrierClient>,
    notifier: Arc<dyn Notifier>,
    settings: FulfillmentSettings,
) -> Arc<AppState> {
    let ctx = FulfillmentContext::new(store, carrier, commission, notifier).with_settings(settings);
    Arc::new(AppState {
        orchestrator: OrderOrchestrator::new(Arc::new(ctx)),
    })
}

/// Creates application state backed by the in-memory store and the offline carrier.
pub fn create_default_state() -> Arc<AppState> {
    let store = Arc::new(InMemoryLedgerStore::new());
    create_state(
        store.clone(),
        store,
        Arc::new(TracingCarrier::new()),
        Arc::new(TracingNotifier),
        FulfillmentSettings::default(),
    )
}

/// Builds application state from configuration.
///
/// Connects to PostgreSQL and runs migrations when `DATABASE_URL` is set,
/// otherwise uses the in-memory store.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, StartupError> {
    let (store, commission): (Arc<dyn LedgerStore>, Arc<dyn CommissionSettings>) =
        match &config.database_url {
            Some(url) => {
                let store = Arc::new(PostgresLedgerStore::connect(url).await?);
                store.run_migrations().await?;
                tracing::info!("using PostgreSQL ledger store");
                let commission: Arc<dyn CommissionSettings> = store.clone();
                (store as Arc<dyn LedgerStore>, commission)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory ledger store");
                let store = Arc::new(InMemoryLedgerStore::new());
                let commission: Arc<dyn CommissionSettings> = store.clone();
                (store as Arc<dyn LedgerStore>, commission)
            }
        };

    let carrier = build_carrier(config)?;

    Ok(create_state(
        store,
        commission,
        carrier,
        Arc::new(TracingNotifier),
        config.fulfillment_settings(),
    ))
}

fn build_carrier(config: &Config) -> Result<Arc<dyn CarrierClient>, CarrierError> {
    let tokens: Arc<dyn TokenProvider> = match &config.carrier_auth {
        CarrierAuth::Token(token) => Arc::new(StaticTokenProvider::new(token.clone())),
        CarrierAuth::Login { email, password } => {
            let client = reqwest::Client::builder()
                .timeout(config.external_timeout)
                .build()
                .map_err(|e| CarrierError::Transport(e.to_string()))?;
            Arc::new(LoginTokenProvider::new(
                client,
                &config.carrier_base_url,
                email.clone(),
                password.clone(),
            ))
        }
        CarrierAuth::Disabled => {
            tracing::warn!("carrier credentials not set, shipments are only logged");
            return Ok(Arc::new(TracingCarrier::new()));
        }
    };

    Ok(Arc::new(HttpCarrierClient::new(
        &config.carrier_base_url,
        tokens,
        config.external_timeout,
    )?))
}
