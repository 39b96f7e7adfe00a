//! Read-after-write state verification
//!
//! [`StateVerifier`] is what post-condition checks go through. The
//! service is eventually consistent, so callers poll with a bounded
//! [`PollPolicy`] instead of failing on the first absent read.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::commands::{ContentClient, GetOptions};
use crate::config::VerifierConfig;
use crate::error::{ContractError, ContractResult};
use crate::fixture::Payload;

/// A field whose persisted value differs from the expected one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: Value,
    /// `None` when the field is missing from the row
    pub actual: Option<Value>,
}

/// What the verifier saw for one content identifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub content_id: String,
    pub row: Option<Payload>,
    pub mismatches: Vec<FieldMismatch>,
}

impl VerificationResult {
    pub fn present(content_id: &str, row: Payload) -> Self {
        Self {
            content_id: content_id.to_string(),
            row: Some(row),
            mismatches: Vec::new(),
        }
    }

    pub fn absent(content_id: &str) -> Self {
        Self {
            content_id: content_id.to_string(),
            row: None,
            mismatches: Vec::new(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.row.is_some()
    }

    /// Present and every expected field matched
    pub fn is_consistent(&self) -> bool {
        self.is_present() && self.mismatches.is_empty()
    }

    /// Recompute mismatches of the row against `expected`
    pub fn compare(mut self, expected: &Payload) -> Self {
        self.mismatches = expected
            .iter()
            .filter_map(|(field, want)| {
                let actual = self.row.as_ref().and_then(|row| row.get(field));
                if actual == Some(want) {
                    None
                } else {
                    Some(FieldMismatch {
                        field: field.clone(),
                        expected: want.clone(),
                        actual: actual.cloned(),
                    })
                }
            })
            .collect();
        self
    }
}

#[async_trait]
pub trait StateVerifier: Send + Sync {
    /// Read back the persisted row, `None` if it is not (yet) visible
    async fn verify(&self, content_id: &str) -> ContractResult<Option<VerificationResult>>;

    /// Read back and compare against `expected`
    async fn verify_fields(&self, content_id: &str, expected: &Payload) -> ContractResult<VerificationResult> {
        let result = self
            .verify(content_id)
            .await?
            .unwrap_or_else(|| VerificationResult::absent(content_id));
        Ok(result.compare(expected))
    }
}

/// Bounded polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    /// Single read, no waiting
    pub fn once() -> Self {
        Self {
            attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&VerifierConfig::default())
    }
}

impl From<&VerifierConfig> for PollPolicy {
    fn from(config: &VerifierConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            interval: config.interval(),
        }
    }
}

/// Poll until the content is visible
pub async fn verify_eventually(
    verifier: &dyn StateVerifier,
    content_id: &str,
    policy: PollPolicy,
) -> ContractResult<VerificationResult> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(result) = verifier.verify(content_id).await? {
            return Ok(result);
        }
        if attempt < attempts {
            warn!("{} not visible yet (attempt {}/{})", content_id, attempt, attempts);
            tokio::time::sleep(policy.interval).await;
        }
    }
    warn!("{} still not visible after {} attempts", content_id, attempts);
    Err(ContractError::VerificationTimeout {
        content_id: content_id.to_string(),
        attempts,
    })
}

/// Poll until the content is visible and matches `expected`.
///
/// A row that stays inconsistent is returned after the last attempt so the
/// caller can assert on the mismatches; a row that never appears is an error.
pub async fn verify_fields_eventually(
    verifier: &dyn StateVerifier,
    content_id: &str,
    expected: &Payload,
    policy: PollPolicy,
) -> ContractResult<VerificationResult> {
    let attempts = policy.attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        let result = verifier.verify_fields(content_id, expected).await?;
        if result.is_consistent() {
            return Ok(result);
        }
        last = Some(result);
        if attempt < attempts {
            warn!("{} not consistent yet (attempt {}/{})", content_id, attempt, attempts);
            tokio::time::sleep(policy.interval).await;
        }
    }
    match last {
        Some(result) if result.is_present() => Ok(result),
        _ => Err(ContractError::VerificationTimeout {
            content_id: content_id.to_string(),
            attempts,
        }),
    }
}

/// Verifier that reads rows back through the retrieval endpoint
pub struct HttpStateVerifier {
    client: ContentClient,
    row_id: Option<String>,
    options: GetOptions,
}

impl HttpStateVerifier {
    pub fn new(client: ContentClient) -> Self {
        Self {
            client,
            row_id: None,
            options: GetOptions::default(),
        }
    }

    /// Only accept the row with this `content_row_id`
    pub fn for_row(mut self, row_id: impl Into<String>) -> Self {
        self.row_id = Some(row_id.into());
        self
    }

    pub fn with_options(mut self, options: GetOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl StateVerifier for HttpStateVerifier {
    async fn verify(&self, content_id: &str) -> ContractResult<Option<VerificationResult>> {
        let envelope = self.client.get(content_id, &self.options).await?;
        if envelope.status == 404 {
            return Ok(None);
        }
        if !envelope.is_success() {
            return Err(ContractError::AssertionFailed(format!(
                "read-back of {} returned status {}",
                content_id, envelope.status
            )));
        }

        let row = envelope.rows().into_iter().find(|row| match &self.row_id {
            Some(want) => row.get("content_row_id").and_then(Value::as_str) == Some(want.as_str()),
            None => true,
        });
        Ok(row.map(|row| VerificationResult::present(content_id, row.clone())))
    }
}
