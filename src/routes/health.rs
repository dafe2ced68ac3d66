// src/routes/health.rs
//! API health check endpoint for the TrailSafe safety backend.
//!
//! This module defines the `/api/health` route used by container orchestrators
//! and uptime checks to verify that the service is running and able to respond
//! to HTTP requests. It follows the Explicit Module Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter containing the route

use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// JSON response body for the `/api/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    ts: DateTime<Utc>,
}

/// Handle `GET /api/health`.
///
/// Does not touch the database or the notification gateway.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        ts: Utc::now(),
    })
}

/// Create a subrouter containing the `/api/health` route.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api/health", get(health))
}
