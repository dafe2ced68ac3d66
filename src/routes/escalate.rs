use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{rejection_response, AppState, DeliveryReport};
use crate::escalation::build_message;
use crate::{Alert, Contact, DeliveryOutcome, EscalationTrigger, LastKnown};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/safety/escalate", post(handler))
}

/// Body of `POST /api/safety/escalate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateRequest {
    hike_id: Option<String>,
    #[serde(default)]
    contacts: Vec<Contact>,
    last_known: LastKnown,
    /// Defaults to a missed check-in ("no response from hiker").
    #[serde(default)]
    trigger: EscalationTrigger,
}

#[derive(Debug, Serialize)]
struct EscalateResponse {
    ok: bool,
    delivery: DeliveryReport,
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<EscalateRequest>, JsonRejection>,
) -> impl IntoResponse {
    // ---
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response("invalid_request", rejection),
    };

    info!(
        "POST /api/safety/escalate - {} contacts, trigger {}",
        req.contacts.len(),
        req.trigger.as_str()
    );

    let sent = escalate(
        &state,
        req.hike_id,
        &req.contacts,
        req.trigger,
        &req.last_known,
    )
    .await;

    let body = EscalateResponse {
        ok: true,
        delivery: DeliveryReport { sent },
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Notify contacts and record the alert. Storage failures are logged only.
pub(super) async fn escalate(
    state: &AppState,
    hike_id: Option<String>,
    contacts: &[Contact],
    trigger: EscalationTrigger,
    last_known: &LastKnown,
) -> Vec<DeliveryOutcome> {
    // ---
    let message = build_message(&trigger, last_known);
    let sent = state
        .coordinator
        .dispatch(contacts, &message, last_known)
        .await;

    let alert = Alert::from_outcomes(hike_id, trigger, message, &sent);
    if let Err(e) = state.store.insert_alert(&alert).await {
        error!("Failed to store alert: {}", e);
    }

    sent
}
