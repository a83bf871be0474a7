//! HTTP route handlers: lots, events, verification, demo seed.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracechain_core::{
    EventPayload, GenericEvent, NewLot, SensorReading, TraceError, TransportEvent,
};

use super::json_error;
use super::state::AppState;
use crate::seed::seed_demo;

/// Map a core error onto an HTTP status and JSON error body.
fn error_response(e: TraceError) -> Response {
    let status = match &e {
        TraceError::LotNotFound { .. } => StatusCode::NOT_FOUND,
        TraceError::LotAlreadyExists { .. } => StatusCode::BAD_REQUEST,
        TraceError::InvalidPayload(_) | TraceError::InvalidLot(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TraceError::Storage(_) => {
            tracing::error!(error = %e, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &e.to_string()).into_response()
}

fn rejection_response(rejection: JsonRejection) -> Response {
    json_error(StatusCode::UNPROCESSABLE_ENTITY, &rejection.body_text()).into_response()
}

fn ok_status() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": tracechain_core::VERSION,
    });
    (StatusCode::OK, Json(response))
}

/// POST /api/harvests
pub(crate) async fn handle_create_lot(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewLot>, JsonRejection>,
) -> Response {
    let Json(lot) = match body {
        Ok(b) => b,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.log.create_lot(lot).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn record(state: &AppState, body: EventPayload) -> Response {
    match state.log.record(body).await {
        Ok(_) => ok_status(),
        Err(e) => error_response(e),
    }
}

/// POST /api/sensors
pub(crate) async fn handle_sensor(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SensorReading>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(b)) => record(&state, EventPayload::Sensor(b)).await,
        Err(rejection) => rejection_response(rejection),
    }
}

/// POST /api/transport
pub(crate) async fn handle_transport(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TransportEvent>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(b)) => record(&state, EventPayload::Transport(b)).await,
        Err(rejection) => rejection_response(rejection),
    }
}

/// POST /api/events
pub(crate) async fn handle_generic_event(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenericEvent>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(b)) => record(&state, EventPayload::Generic(b)).await,
        Err(rejection) => rejection_response(rejection),
    }
}

/// GET /api/lots
pub(crate) async fn handle_list_lots(State(state): State<Arc<AppState>>) -> Response {
    match state.log.list_lots().await {
        Ok(lots) => (StatusCode::OK, Json(serde_json::json!({ "lots": lots }))).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/lots/{lot_id}
pub(crate) async fn handle_get_lot(
    State(state): State<Arc<AppState>>,
    Path(lot_id): Path<String>,
) -> Response {
    match state.log.summarize(&lot_id).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/lots/{lot_id}/verify
pub(crate) async fn handle_verify_lot(
    State(state): State<Arc<AppState>>,
    Path(lot_id): Path<String>,
) -> Response {
    match state.log.verify(&lot_id).await {
        Ok(verification) => (StatusCode::OK, Json(verification)).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/lots/{lot_id}
pub(crate) async fn handle_delete_lot(
    State(state): State<Arc<AppState>>,
    Path(lot_id): Path<String>,
) -> Response {
    match state.log.delete_lot(&lot_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted", "lot_id": lot_id})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/seed
pub(crate) async fn handle_seed(State(state): State<Arc<AppState>>) -> Response {
    match seed_demo(&state.log).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.to_json())).into_response(),
        Err(e) => error_response(e),
    }
}
