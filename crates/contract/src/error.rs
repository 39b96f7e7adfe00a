//! Error types for the contract harness
//!
//! HTTP-level failures (4xx/5xx) are never errors here: they come back as a
//! [`ResponseEnvelope`](crate::envelope::ResponseEnvelope). Only transport
//! failures, fixture lookups and harness misuse surface as [`ContractError`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure below the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// DNS resolution or TCP/TLS connect failed
    Connect,
    /// The request did not complete within the configured timeout
    Timeout,
    /// The request could not be built or sent
    Request,
    /// The response body could not be read
    Body,
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Connect => "connect",
            TransportKind::Timeout => "timeout",
            TransportKind::Request => "request",
            TransportKind::Body => "body",
            TransportKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Transport failure ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("Fixture not found: {0}")]
    FixtureNotFound(String),

    #[error("Fixture {name} is invalid: {reason}")]
    FixtureInvalid { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Suite parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Content {content_id} not visible after {attempts} attempts")]
    VerificationTimeout { content_id: String, attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ContractError {
    /// Whether this error came from below the HTTP layer
    pub fn is_transport(&self) -> bool {
        matches!(self, ContractError::Transport { .. })
    }

    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            ContractError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ContractError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportKind::Timeout
        } else if e.is_connect() {
            TransportKind::Connect
        } else if e.is_body() || e.is_decode() {
            TransportKind::Body
        } else if e.is_request() || e.is_builder() {
            TransportKind::Request
        } else {
            TransportKind::Other
        };
        ContractError::Transport {
            kind,
            message: e.to_string(),
        }
    }
}

pub type ContractResult<T> = Result<T, ContractError>;
