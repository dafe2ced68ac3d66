use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::{error_response, rejection_response, AppState};
use crate::{Anomaly, MotionSample};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/safety/analyze", post(handler))
}

/// Body of `POST /api/safety/analyze`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    hike_id: Option<String>,
    /// A missing or `null` window is treated as empty.
    #[serde(default)]
    samples: Option<Vec<MotionSample>>,
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> impl IntoResponse {
    // ---
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response("invalid_sample", rejection),
    };
    let samples = req.samples.unwrap_or_default();

    info!(
        "POST /api/safety/analyze - {} samples for hike {:?}",
        samples.len(),
        req.hike_id
    );

    let verdict = match state.analyzer.analyze(&samples) {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!("Rejected sample window: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "invalid_sample", e.to_string());
        }
    };

    debug!("Verdict: {:?}", verdict);

    if let Some(hike_id) = req.hike_id.as_deref() {
        if let Some(anomaly) = Anomaly::from_verdict(hike_id, &verdict) {
            info!(
                "Anomaly {} ({}, score {:.2}) on hike {}",
                anomaly.id, anomaly.kind, anomaly.score, hike_id
            );
            if let Err(e) = state.store.insert_anomaly(&anomaly).await {
                error!("Failed to store anomaly: {}", e);
            }
        }
    }

    (StatusCode::OK, Json(verdict)).into_response()
}
