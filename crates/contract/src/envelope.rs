//! Normalized response envelope
//!
//! Every HTTP exchange, whatever its status, resolves to a
//! [`ResponseEnvelope`]. Assertions read it through typed accessors instead of
//! poking at untyped body properties.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{ContractError, ContractResult};

/// Parsed response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Body {
    Json(Value),
    /// Non-JSON payload, kept verbatim (lossy UTF-8)
    Text(String),
    Empty,
}

impl Body {
    /// Parse raw bytes, preferring JSON
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Body::Empty;
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// Status, headers and body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: u16,
    /// Header names are lower-cased; repeated headers are joined with ", "
    pub headers: BTreeMap<String, String>,
    pub body: Body,
}

/// Identifiers returned by a successful create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedContent {
    pub content_id: String,
    pub content_row_id: String,
}

impl ResponseEnvelope {
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: Body) -> Self {
        Self { status, headers, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Look up a value by JSON pointer (`/jwt/accessToken`)
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.json()?.pointer(pointer)
    }

    /// The `message` field every error response carries
    pub fn message(&self) -> Option<&str> {
        self.pointer("/message")?.as_str()
    }

    /// Deserialize the JSON body into a typed value
    pub fn parse<T: DeserializeOwned>(&self) -> ContractResult<T> {
        let value = self.json().ok_or_else(|| {
            ContractError::AssertionFailed(format!("status {} response body is not JSON", self.status))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn created(&self) -> ContractResult<CreatedContent> {
        self.parse()
    }

    /// Bearer credential issued by a successful login
    pub fn access_token(&self) -> Option<&str> {
        self.pointer("/jwt/accessToken")?.as_str()
    }

    /// Content rows of a retrieval response; a bare object counts as one row
    pub fn rows(&self) -> Vec<&Map<String, Value>> {
        match self.json() {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            Some(Value::Object(row)) => vec![row],
            _ => Vec::new(),
        }
    }
}

static CONTENT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q\d+$").expect("static pattern"));

/// Whether `s` looks like a service-assigned content identifier
pub fn is_content_id(s: &str) -> bool {
    CONTENT_ID_RE.is_match(s)
}

/// Whether `s` is a 3-segment dot-delimited token
pub fn is_jwt_shaped(s: &str) -> bool {
    let segments: Vec<&str> = s.split('.').collect();
    segments.len() == 3 && segments.iter().all(|seg| !seg.is_empty())
}
