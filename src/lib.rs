//! TrailSafe safety backend.
//!
//! The crate is split into a pure core and the plumbing around it:
//! - [`analyzer`]: Window Analyzer, rule-based anomaly verdicts over a sample
//!   window (no I/O)
//! - [`escalation`]: Escalation Coordinator, concurrent per-contact alert
//!   dispatch over an injected [`gateway::NotificationGateway`]
//! - [`routes`], [`store`], [`schema`], [`config`]: the axum service, Postgres
//!   persistence and environment configuration used by the binary

pub mod analyzer;
pub mod config;
pub mod error;
pub mod escalation;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

pub use analyzer::{analyze, WindowAnalyzer};
pub use config::Config;
pub use error::{AnalyzeError, GatewayError, LocationError};
pub use escalation::EscalationCoordinator;
pub use models::{
    Alert, Anomaly, AnomalyType, AnomalyVerdict, CheckIn, CheckInResult, Contact,
    DeliveryOutcome, DeliveryStatus, EscalationTrigger, LastKnown, MotionSample,
    NormalizedSample, RawLastKnown, VerdictDetails,
};
