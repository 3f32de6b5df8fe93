//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the websocket endpoint plus two small HTTP status endpoints under one axum
//! router. The websocket path is configurable; the status paths are fixed.

pub mod ws;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::hub::Hub;

/// Build the router serving `hub` at `ws_path`.
pub fn app(hub: Hub, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn healthz(State(hub): State<Hub>) -> StatusCode {
    if hub.is_shutting_down() { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    live: usize,
    added: u64,
    removed: u64,
    shutting_down: bool,
}

async fn stats(State(hub): State<Hub>) -> Json<StatsResponse> {
    let registry = hub.registry();
    let totals = registry.stats();
    Json(StatsResponse {
        live: registry.len(),
        added: totals.added,
        removed: totals.removed,
        shutting_down: hub.is_shutting_down(),
    })
}
