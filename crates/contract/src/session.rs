//! Session management
//!
//! A [`SessionContext`] is the single credential slot for one suite run. It
//! is created explicitly and handed to the [`Executor`], which reads the
//! *current* credential at send time. Replacing the session therefore
//! affects every command issued afterwards, never one already in flight.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::envelope::ResponseEnvelope;
use crate::error::ContractResult;
use crate::executor::{Executor, RequestDescriptor};

pub const LOGIN_PATH: &str = "/api/authX/login";

/// Cached authentication state
#[derive(Clone)]
pub struct Session {
    pub credential: Option<String>,
    pub identity: String,
    pub issued_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("identity", &self.identity)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Shared, explicitly passed credential slot
#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    /// Bearer credential of the current session, if any
    pub fn bearer(&self) -> Option<String> {
        self.inner.read().as_ref().and_then(|s| s.credential.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }

    /// Overwrite the slot with a new session
    pub fn replace(&self, session: Session) {
        *self.inner.write() = Some(session);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session", &*self.inner.read())
            .finish()
    }
}

/// Login body; optional identifiers are left off the wire when unset
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("product_id", &self.product_id)
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            product_id: None,
            device_id: None,
        }
    }

    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            product_id: credentials.product_id.clone(),
            device_id: credentials.device_id.clone(),
        }
    }
}

/// POST the login body and return the envelope as-is
pub async fn login(executor: &Executor, request: &LoginRequest) -> ContractResult<ResponseEnvelope> {
    let descriptor = RequestDescriptor::post(LOGIN_PATH)
        .json(serde_json::to_value(request)?)
        .anonymous();
    executor.execute(descriptor).await
}

/// Login and, on 200, store the issued credential in the executor's session.
///
/// Any other status leaves the session untouched.
pub async fn login_and_cache(
    executor: &Executor,
    request: &LoginRequest,
) -> ContractResult<ResponseEnvelope> {
    let envelope = login(executor, request).await?;
    if envelope.status != 200 {
        return Ok(envelope);
    }

    match envelope.access_token() {
        Some(token) => {
            executor.session().replace(Session {
                credential: Some(token.to_string()),
                identity: request.username.clone(),
                issued_at: Utc::now(),
            });
            info!("Session established for {}", request.username);
        }
        None => {
            warn!("Login for {} returned 200 without jwt.accessToken", request.username);
        }
    }
    Ok(envelope)
}
