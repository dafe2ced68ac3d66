//! Data models shared by the analyzer, the escalation coordinator and the
//! HTTP layer.
//!
//! Wire shapes use camelCase field names so existing TrailSafe clients can
//! post the same JSON they always have.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::parse_instant;
use crate::error::LocationError;

// ---

/// One telemetry point from a hiker's device, as received.
///
/// Only `ts` is required. Numeric fields the rules read default to zero during
/// normalization (see [`crate::analyzer::normalize`]).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionSample {
    // ---
    /// RFC 3339 / ISO 8601 string, or epoch milliseconds.
    pub ts: Option<serde_json::Value>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub elev_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub vert_rate_mps: Option<f64>,
    pub bearing_deg: Option<f64>,
    /// Acceleration magnitude. Reserved, no rule reads it yet.
    pub accel: Option<f64>,
}

/// A sample after defaults are applied and the timestamp is parsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedSample {
    pub ts: DateTime<Utc>,
    pub speed_kmh: f64,
    pub vert_rate_mps: f64,
    pub bearing_deg: f64,
}

/// Closed set of anomaly labels, in rule priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    UnusualSpeed,
    ElevationDrop,
    ExtendedIdleness,
    ErraticHeading,
}

impl AnomalyType {
    /// Score contribution when the matching rule fires.
    pub fn weight(self) -> f64 {
        match self {
            AnomalyType::UnusualSpeed => 0.35,
            AnomalyType::ElevationDrop => 0.35,
            AnomalyType::ExtendedIdleness => 0.2,
            AnomalyType::ErraticHeading => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyType::UnusualSpeed => "unusual_speed",
            AnomalyType::ElevationDrop => "elevation_drop",
            AnomalyType::ExtendedIdleness => "extended_idleness",
            AnomalyType::ErraticHeading => "erratic_heading",
        }
    }

    /// Human readable label used in alert messages.
    pub fn label(self) -> &'static str {
        match self {
            AnomalyType::UnusualSpeed => "unusual speed",
            AnomalyType::ElevationDrop => "sudden elevation drop",
            AnomalyType::ExtendedIdleness => "extended idleness",
            AnomalyType::ErraticHeading => "erratic heading",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic metrics reported with a triggered verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictDetails {
    /// Mean speed over the window, km/h.
    pub mean: f64,
    pub max_speed: f64,
    pub idle_dur_sec: f64,
    /// Population variance of bearings, deg².
    pub heading_var: f64,
}

/// Output of one analysis call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    // ---
    pub triggered: bool,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<AnomalyType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<VerdictDetails>,

    /// Every rule that fired, highest priority first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fired: Vec<AnomalyType>,
}

impl AnomalyVerdict {
    /// The defined result for an empty window.
    pub fn no_data() -> Self {
        Self::default()
    }
}

/// A triggered verdict stamped for storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    // ---
    pub id: Uuid,
    pub hike_id: String,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AnomalyType,
    pub score: f64,
    pub details: VerdictDetails,
}

impl Anomaly {
    /// Build a record from a verdict. Returns `None` for non-triggered verdicts.
    pub fn from_verdict(hike_id: &str, verdict: &AnomalyVerdict) -> Option<Self> {
        // ---
        if !verdict.triggered {
            return None;
        }

        Some(Anomaly {
            id: Uuid::new_v4(),
            hike_id: hike_id.to_string(),
            ts: Utc::now(),
            kind: verdict.kind?,
            score: verdict.score.unwrap_or_default(),
            details: verdict.details?,
        })
    }
}

/// An emergency contact. Either destination may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Contact {
    /// Where alerts go: the phone number, else the email address.
    pub fn destination(&self) -> Option<&str> {
        // ---
        [self.phone.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|d| !d.is_empty())
    }
}

/// Last known position of the hiker.
///
/// `ts` accepts the same formats as sample timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLastKnown")]
pub struct LastKnown {
    pub ts: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    /// Battery percentage, if the device reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
}

impl LastKnown {
    pub fn ts_display(&self) -> String {
        self.ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Last-known location as received, before the timestamp is parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLastKnown {
    pub ts: Option<serde_json::Value>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub battery: Option<f64>,
}

impl TryFrom<RawLastKnown> for LastKnown {
    type Error = LocationError;

    fn try_from(raw: RawLastKnown) -> Result<Self, Self::Error> {
        // ---
        let ts = match raw.ts {
            None | Some(serde_json::Value::Null) => return Err(LocationError::MissingTimestamp),
            Some(value) => parse_instant(&value)
                .ok_or_else(|| LocationError::InvalidTimestamp(value.to_string()))?,
        };

        Ok(LastKnown {
            ts,
            lat: raw.lat,
            lng: raw.lng,
            battery: raw.battery,
        })
    }
}

/// What caused an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationTrigger {
    Anomaly {
        #[serde(rename = "type")]
        kind: AnomalyType,
        score: f64,
    },
    Sos,
    #[default]
    MissedCheckin,
}

impl EscalationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTrigger::Anomaly { .. } => "anomaly",
            EscalationTrigger::Sos => "sos",
            EscalationTrigger::MissedCheckin => "missed_checkin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Failed,
    /// Set later by gateway callbacks, never by the coordinator.
    Delivered,
}

/// Per-contact result of one escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn queued(contact: &Contact) -> Self {
        Self {
            id: contact.id.clone(),
            phone: contact.phone.clone(),
            email: contact.email.clone(),
            status: DeliveryStatus::Queued,
            error: None,
        }
    }

    pub fn failed(contact: &Contact, reason: impl Into<String>) -> Self {
        Self {
            id: contact.id.clone(),
            phone: contact.phone.clone(),
            email: contact.email.clone(),
            status: DeliveryStatus::Failed,
            error: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInResult {
    Ok,
    Missed,
}

impl CheckInResult {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckInResult::Ok => "ok",
            CheckInResult::Missed => "missed",
        }
    }
}

/// A recorded check-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub id: Uuid,
    pub hike_id: String,
    pub ts: DateTime<Utc>,
    pub result: CheckInResult,
}

/// A recorded escalation, summarised for the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    // ---
    pub id: Uuid,
    pub hike_id: Option<String>,
    pub ts: DateTime<Utc>,
    pub trigger: EscalationTrigger,
    pub message: String,
    pub queued: i32,
    pub failed: i32,
}

impl Alert {
    pub fn from_outcomes(
        hike_id: Option<String>,
        trigger: EscalationTrigger,
        message: String,
        outcomes: &[DeliveryOutcome],
    ) -> Self {
        // ---
        let failed = outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Failed)
            .count() as i32;

        Alert {
            id: Uuid::new_v4(),
            hike_id,
            ts: Utc::now(),
            trigger,
            message,
            queued: outcomes.len() as i32 - failed,
            failed,
        }
    }
}
