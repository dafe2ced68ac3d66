//! Route gateway for the safety API (EMBP).
//!
//! Each sibling module exports a subrouter; this module merges them and owns
//! the shared [`AppState`] so `main.rs` only needs [`router`].

use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::gateway::NotificationGateway;
use crate::store::SafetyStore;
use crate::{Config, DeliveryOutcome, EscalationCoordinator, WindowAnalyzer};

mod analyze;
mod checkin;
mod escalate;
mod health;

// ---

/// State shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub analyzer: WindowAnalyzer,
    pub coordinator: EscalationCoordinator,
    pub store: Arc<dyn SafetyStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SafetyStore>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        // ---
        let analyzer = WindowAnalyzer::new(config.trigger_threshold);
        let coordinator = EscalationCoordinator::new(gateway, config.notify_timeout());
        Self {
            config,
            analyzer,
            coordinator,
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(analyze::router())
        .merge(escalate::router())
        .merge(checkin::router())
        .merge(health::router())
        .with_state(state)
}

/// Delivery report embedded in escalation responses.
#[derive(Debug, Serialize)]
pub struct DeliveryReport {
    pub sent: Vec<DeliveryOutcome>,
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: String) -> Response {
    (status, Json(ErrorBody { error, message })).into_response()
}

/// Malformed or mistyped JSON bodies are answered with a 400 error body
/// instead of axum's plain-text rejection.
fn rejection_response(error: &'static str, rejection: JsonRejection) -> Response {
    // ---
    let message = rejection.body_text();
    warn!("Rejected request body ({}): {}", rejection.status(), message);
    error_response(StatusCode::BAD_REQUEST, error, message)
}
