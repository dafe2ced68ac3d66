//! Error types for the safety core.

use thiserror::Error;

/// Rejections raised while validating a sample window.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyzeError {
    #[error("sample {index} is missing a timestamp")]
    MissingTimestamp { index: usize },

    #[error("sample {index} has an unparseable timestamp: {value}")]
    InvalidTimestamp { index: usize, value: String },
}

/// Failures reported by a notification gateway for a single contact.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway rejected message: {0}")]
    Rejected(String),

    #[error("gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway did not answer within {0} ms")]
    Timeout(u64),

    #[error("contact has no phone or email")]
    NoDestination,
}

/// Rejections raised while reading a last-known location.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocationError {
    #[error("lastKnown is missing a timestamp")]
    MissingTimestamp,

    #[error("lastKnown has an unparseable timestamp: {0}")]
    InvalidTimestamp(String),
}
