//! `tracechain serve` -- HTTP JSON API over the lot event log.
//!
//! Security features:
//! - CORS headers on all responses (permissive)
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//! - Optional API key authentication (`TRACECHAIN_API_KEY`)
//!
//! Endpoints:
//! - GET    /health                    - Server status (exempt from auth)
//! - POST   /api/harvests              - Create a lot
//! - POST   /api/sensors               - Append a sensor reading
//! - POST   /api/transport             - Append a transport event
//! - POST   /api/events                - Append an event of any type
//! - GET    /api/lots                  - List lots
//! - GET    /api/lots/{lot_id}         - Lot summary with its chain
//! - GET    /api/lots/{lot_id}/verify  - Chain integrity check
//! - DELETE /api/lots/{lot_id}         - Remove a lot and its chain
//! - POST   /api/seed                  - Load the demo lot
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracechain_core::EventLog;

use self::handlers::{
    handle_create_lot, handle_delete_lot, handle_generic_event, handle_get_lot, handle_health,
    handle_list_lots, handle_not_found, handle_seed, handle_sensor, handle_transport,
    handle_verify_lot,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use crate::config::ServeConfig;
use crate::store::open_store;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/harvests", post(handle_create_lot))
        .route("/api/sensors", post(handle_sensor))
        .route("/api/transport", post(handle_transport))
        .route("/api/events", post(handle_generic_event))
        .route("/api/lots", get(handle_list_lots))
        .route(
            "/api/lots/{lot_id}",
            get(handle_get_lot).delete(handle_delete_lot),
        )
        .route("/api/lots/{lot_id}/verify", get(handle_verify_lot))
        .route("/api/seed", post(handle_seed))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub async fn start_server(
    config: ServeConfig,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config.data.as_deref())?;
    match &config.data {
        Some(path) => tracing::info!(journal = %path.display(), "using journal store"),
        None => tracing::info!("using in-memory store; data is lost on exit"),
    }

    if config.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    tracing::info!(
        rate_limit = config.rate_limit,
        "rate limit: requests per minute per IP"
    );

    let state = Arc::new(AppState {
        log: EventLog::new(store),
        rate_limiter: RateLimiter::new(config.rate_limit),
        api_key: config.api_key,
    });
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);

    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let tls =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!("tracechain listening on https://{}", addr);
        axum_server::bind_rustls(socket_addr, tls)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("tracechain listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(e) => {
            // Without a handler the server keeps running until killed.
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
