//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Read-only views of the fusion state
//! - Policy read / replace
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds().max(0) as u64;
    let cycle = state.reports.borrow().cycle;

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: uptime,
        cycle,
    };

    Json(response)
}
