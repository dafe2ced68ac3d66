use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{error_response, escalate::escalate, rejection_response, AppState, DeliveryReport};
use crate::{CheckIn, CheckInResult, Contact, EscalationTrigger, LastKnown, RawLastKnown};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/safety/checkin", post(handler))
}

/// Body of `POST /api/safety/checkin`.
///
/// `contacts` and `lastKnown` are only used when the check-in was missed.
/// `lastKnown` is validated after the check-in is stored, so a bad location
/// never loses the check-in itself.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    hike_id: String,
    result: CheckInResult,
    #[serde(default)]
    contacts: Vec<Contact>,
    last_known: Option<RawLastKnown>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckInResponse {
    id: Uuid,
    next_check_in_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delivery: Option<DeliveryReport>,
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<CheckInRequest>, JsonRejection>,
) -> impl IntoResponse {
    // ---
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response("invalid_request", rejection),
    };

    info!(
        "POST /api/safety/checkin - hike {} result {}",
        req.hike_id,
        req.result.as_str()
    );

    let now = Utc::now();
    let checkin = CheckIn {
        id: Uuid::new_v4(),
        hike_id: req.hike_id.clone(),
        ts: now,
        result: req.result,
    };

    if let Err(e) = state.store.insert_checkin(&checkin).await {
        error!("Failed to store check-in: {}", e);
    }

    let last_known = match req.last_known.map(LastKnown::try_from).transpose() {
        Ok(last_known) => last_known,
        Err(e) => {
            warn!("Check-in {} stored but lastKnown rejected: {}", checkin.id, e);
            return error_response(StatusCode::BAD_REQUEST, "invalid_location", e.to_string());
        }
    };

    let delivery = match (req.result, last_known) {
        (CheckInResult::Missed, Some(last_known)) if !req.contacts.is_empty() => {
            warn!("Missed check-in on hike {}, escalating", req.hike_id);
            let sent = escalate(
                &state,
                Some(req.hike_id),
                &req.contacts,
                EscalationTrigger::MissedCheckin,
                &last_known,
            )
            .await;
            Some(DeliveryReport { sent })
        }
        (CheckInResult::Missed, _) => {
            debug!("Missed check-in without contacts or location, not escalating");
            None
        }
        (CheckInResult::Ok, _) => None,
    };

    let body = CheckInResponse {
        id: checkin.id,
        next_check_in_at: now + state.config.checkin_interval(),
        delivery,
    };
    (StatusCode::OK, Json(body)).into_response()
}
