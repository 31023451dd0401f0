//! # Errors
//!
//! Construction-time and per-chunk delivery errors

use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by an HTTP collaborator
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raised eagerly while configuring a [Poster](crate::Poster) or appending to a [Batch](crate::Batch)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("measurement name must not be empty")]
    EmptyName,
    #[error("aggregated gauge {0} must summarize at least one sample")]
    EmptyAggregate(String),
    #[error("gauge {0} must have finite values")]
    NonFinite(String),
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
    #[error("timeout must be greater than zero")]
    InvalidTimeout,
    #[error("endpoint missing")]
    MissingEndpoint,
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
    #[error("invalid header {0}")]
    InvalidHeader(String),
}

/// Why a single chunk never got a response from the ingestion endpoint
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("unable to serialize chunk: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unable to build request: {0}")]
    InvalidRequest(#[from] http::Error),
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}
