use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use toneout_common::codes::StatusCodeRegistry;
use toneout_common::Config;
use toneout_dispatch::{DispatchCore, PanicWatch};
use toneout_events::NotificationStore;
use toneout_store::PgDispatchStore;

mod error;
mod rest;

pub struct AppState {
    pub core: DispatchCore,
    pub store: PgDispatchStore,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            error!(error = %e, "health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable").into_response()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("toneout=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = PgDispatchStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let codes = Arc::new(StatusCodeRegistry::load(config.status_code_file.as_deref())?);
    let ledger = Arc::new(NotificationStore::new(store.pool().clone()));
    let core = DispatchCore::new(Arc::new(store.clone()), ledger, codes);

    let watch = PanicWatch::new(
        core.store.clone(),
        core.escalation.clone(),
        config.panic_stale_after_secs,
        config.panic_sweep_interval_secs,
    );
    tokio::spawn(watch.run());

    let state = Arc::new(AppState { core, store });

    let app = Router::new()
        // Health check
        .route("/health", get(health))
        // Calls
        .route(
            "/v1/calls",
            post(rest::calls::create_call).get(rest::calls::list_calls),
        )
        .route("/v1/calls/{id}", get(rest::calls::get_call))
        .route("/v1/calls/{id}/assign", post(rest::calls::assign_units))
        .route("/v1/calls/{id}/close", post(rest::calls::close_call))
        .route("/v1/calls/{id}/cancel", post(rest::calls::cancel_call))
        .route("/v1/calls/{id}/priority", post(rest::calls::escalate_priority))
        // Units
        .route(
            "/v1/units",
            post(rest::units::register_unit).get(rest::units::list_units),
        )
        .route("/v1/units/{id}", get(rest::units::get_unit))
        .route("/v1/units/{id}/status", post(rest::units::update_status))
        .route("/v1/units/{id}/log", get(rest::units::unit_log))
        .route("/v1/units/{id}/panic", post(rest::units::panic_button))
        .route("/v1/units/{id}/backup", post(rest::units::request_backup))
        // Alerts
        .route("/v1/alerts", get(rest::alerts::list_alerts))
        .route("/v1/alerts/{id}", get(rest::alerts::get_alert))
        .route("/v1/alerts/{id}/respond", post(rest::alerts::respond_alert))
        .route("/v1/alerts/{id}/resolve", post(rest::alerts::resolve_alert))
        // BOLO + notification feed
        .route("/v1/bolo", post(rest::notifications::route_bolo))
        .route("/v1/notifications", get(rest::notifications::notifications))
        .route(
            "/v1/notifications/{seq}/read",
            post(rest::notifications::mark_read),
        )
        .route("/v1/stream", get(rest::stream::stream))
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path + status + latency
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = config.bind_addr.clone();
    info!("Toneout API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
