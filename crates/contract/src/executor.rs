//! Request execution
//!
//! [`Executor::execute`] resolves to a [`ResponseEnvelope`] for every HTTP
//! status. Only failures below HTTP (connect, timeout, unreadable body) are
//! returned as [`ContractError::Transport`]. Nothing is retried.

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::HarnessConfig;
use crate::envelope::{Body, ResponseEnvelope};
use crate::error::{ContractError, ContractResult};
use crate::session::SessionContext;

/// How the bearer credential is attached to a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// Use the current session credential, if one exists
    #[default]
    Session,
    /// Send no Authorization header at all
    Anonymous,
    /// Send this exact bearer value instead of the session one
    Bearer(String),
}

/// One HTTP call; built fresh for every invocation
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the base URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub auth: AuthMode,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            auth: AuthMode::Session,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    /// Suppress credential injection for unauthenticated calls
    pub fn anonymous(self) -> Self {
        self.auth(AuthMode::Anonymous)
    }

    fn has_explicit_authorization(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()))
    }
}

/// Sends descriptors against one base URL using one session context
#[derive(Clone)]
pub struct Executor {
    client: Client,
    base_url: Url,
    session: SessionContext,
}

impl Executor {
    /// Build an executor with the configured timeout
    pub fn new(config: &HarnessConfig, session: SessionContext) -> ContractResult<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Self::with_client(client, &config.base_url, session)
    }

    pub fn with_client(client: Client, base_url: &str, session: SessionContext) -> ContractResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ContractError::InvalidConfig(format!("base_url {}: {}", base_url, e)))?;
        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a descriptor path against the base URL, keeping any base prefix
    pub fn url_for(&self, path: &str) -> ContractResult<Url> {
        if !path.starts_with('/') {
            return Err(ContractError::InvalidRequest(format!("path must start with '/': {}", path)));
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| ContractError::InvalidRequest(format!("{}: {}", path, e)))
    }

    /// Send one request and normalize the response
    pub async fn execute(&self, descriptor: RequestDescriptor) -> ContractResult<ResponseEnvelope> {
        let url = self.url_for(&descriptor.path)?;
        let mut request = self.client.request(descriptor.method.clone(), url);

        if !descriptor.query.is_empty() {
            request = request.query(&descriptor.query);
        }

        if !descriptor.has_explicit_authorization() {
            let bearer = match &descriptor.auth {
                AuthMode::Session => self.session.bearer(),
                AuthMode::Anonymous => None,
                AuthMode::Bearer(token) => Some(token.clone()),
            };
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }
        }

        for (name, value) in &descriptor.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = ContractError::from(e);
                warn!("{} {} failed: {}", descriptor.method, descriptor.path, err);
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        let headers = normalize_headers(response.headers());
        let bytes = response.bytes().await.map_err(|e| {
            let err = ContractError::from(e);
            warn!("{} {} body read failed: {}", descriptor.method, descriptor.path, err);
            err
        })?;

        debug!("{} {} -> {}", descriptor.method, descriptor.path, status);

        Ok(ResponseEnvelope::new(status, headers, Body::from_bytes(&bytes)))
    }
}

fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}
