//! Declarative YAML contract suites
//!
//! A suite is an ordered list of steps run against one session. Create and
//! update steps can `save_as` a name; later steps refer to the captured
//! identifiers as `${name.content_id}` or `${name.content_row_id}`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::content::QuestionType;
use crate::envelope::{is_jwt_shaped, ResponseEnvelope};
use crate::error::{ContractError, ContractResult};
use crate::fixture::Payload;

/// A complete suite parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSuite {
    /// Unique name for this suite
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering suites
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<ContractStep>,
}

/// How a step authenticates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAuth {
    #[default]
    Session,
    /// No Authorization header
    Anonymous,
    /// A well-formed but bogus bearer token
    Invalid,
}

/// Where a create or update body comes from
#[derive(Debug, Clone, PartialEq)]
pub struct BodySpec<'a> {
    /// Fixture to compose from
    pub fixture: Option<&'a str>,
    /// Literal body, used when no fixture is named
    pub payload: Option<&'a Payload>,
    /// Keys to set over the fixture or literal body
    pub set: &'a Payload,
    /// Keys to drop
    pub remove: &'a [String],
}

/// A single step in a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ContractStep {
    /// Log in; missing credentials fall back to the harness config
    Login {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        product_id: Option<String>,
        #[serde(default)]
        device_id: Option<String>,
        /// Cache the issued credential for later steps
        #[serde(default = "default_true")]
        cache: bool,
        #[serde(default)]
        expect: Option<Expectation>,
    },

    Create {
        question_type: QuestionType,
        #[serde(default)]
        fixture: Option<String>,
        #[serde(default)]
        payload: Option<Payload>,
        #[serde(default)]
        set: Payload,
        #[serde(default)]
        remove: Vec<String>,
        #[serde(default)]
        auth: StepAuth,
        #[serde(default)]
        save_as: Option<String>,
        #[serde(default)]
        expect: Option<Expectation>,
    },

    Update {
        question_type: QuestionType,
        content_id: String,
        #[serde(default)]
        fixture: Option<String>,
        #[serde(default)]
        payload: Option<Payload>,
        #[serde(default)]
        set: Payload,
        #[serde(default)]
        remove: Vec<String>,
        #[serde(default)]
        create_new_version: bool,
        #[serde(default)]
        content_row_id: Option<String>,
        #[serde(default)]
        auth: StepAuth,
        #[serde(default)]
        save_as: Option<String>,
        #[serde(default)]
        expect: Option<Expectation>,
    },

    Get {
        content_id: String,
        #[serde(default)]
        languages: Vec<String>,
        #[serde(default)]
        encryption: Option<bool>,
        #[serde(default)]
        auth: StepAuth,
        #[serde(default)]
        expect: Option<Expectation>,
    },

    /// Read-after-write check with bounded polling
    Verify {
        content_id: String,
        #[serde(default)]
        row_id: Option<String>,
        #[serde(default)]
        fields: Payload,
        #[serde(default)]
        attempts: Option<u32>,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_true() -> bool {
    true
}

impl ContractStep {
    /// Short label used in reports
    pub fn label(&self) -> String {
        match self {
            ContractStep::Login { .. } => "login".to_string(),
            ContractStep::Create { question_type, .. } => format!("create {}", question_type),
            ContractStep::Update {
                question_type,
                content_id,
                create_new_version,
                ..
            } => format!(
                "update {} {}{}",
                question_type,
                content_id,
                if *create_new_version { " (new version)" } else { "" }
            ),
            ContractStep::Get { content_id, .. } => format!("get {}", content_id),
            ContractStep::Verify { content_id, .. } => format!("verify {}", content_id),
            ContractStep::Sleep { ms } => format!("sleep {}ms", ms),
            ContractStep::Log { .. } => "log".to_string(),
        }
    }

    /// Body source of a create or update step
    pub fn body(&self) -> Option<BodySpec<'_>> {
        match self {
            ContractStep::Create {
                fixture,
                payload,
                set,
                remove,
                ..
            }
            | ContractStep::Update {
                fixture,
                payload,
                set,
                remove,
                ..
            } => Some(BodySpec {
                fixture: fixture.as_deref(),
                payload: payload.as_ref(),
                set,
                remove,
            }),
            _ => None,
        }
    }

    pub fn expectation(&self) -> Option<&Expectation> {
        match self {
            ContractStep::Login { expect, .. }
            | ContractStep::Create { expect, .. }
            | ContractStep::Update { expect, .. }
            | ContractStep::Get { expect, .. } => expect.as_ref(),
            _ => None,
        }
    }
}

/// Assertions on a response envelope; unset fields are not checked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectation {
    pub status: Option<u16>,

    /// Any of these statuses is accepted
    pub status_in: Vec<u16>,

    /// Body must carry a non-empty string `message`
    pub has_message: bool,

    pub message_contains: Option<String>,

    /// Regex the body's `content_id` must match
    pub content_id_pattern: Option<String>,

    /// Body must carry a 3-segment `jwt.accessToken`
    pub token_issued: bool,

    /// JSON pointer -> expected value
    pub body: BTreeMap<String, Value>,

    pub row_count: Option<usize>,

    /// A row with this `content_row_id` must be present
    pub contains_row: Option<String>,
}

impl Expectation {
    /// Every violated assertion, in declaration order
    pub fn check(&self, envelope: &ResponseEnvelope) -> Vec<String> {
        let mut failures = Vec::new();

        if let Some(status) = self.status {
            if envelope.status != status {
                failures.push(format!("expected status {}, got {}", status, envelope.status));
            }
        }
        if !self.status_in.is_empty() && !self.status_in.contains(&envelope.status) {
            failures.push(format!("expected status in {:?}, got {}", self.status_in, envelope.status));
        }

        let message = envelope.message();
        if self.has_message && message.map(str::is_empty).unwrap_or(true) {
            failures.push("expected a non-empty message".to_string());
        }
        if let Some(needle) = &self.message_contains {
            match message {
                Some(m) if m.contains(needle.as_str()) => {}
                Some(m) => failures.push(format!("message {:?} does not contain {:?}", m, needle)),
                None => failures.push(format!("expected message containing {:?}, body has none", needle)),
            }
        }

        if let Some(pattern) = &self.content_id_pattern {
            match Regex::new(pattern) {
                Ok(re) => match envelope.pointer("/content_id").and_then(Value::as_str) {
                    Some(id) if re.is_match(id) => {}
                    Some(id) => failures.push(format!("content_id {:?} does not match {}", id, pattern)),
                    None => failures.push("body has no content_id".to_string()),
                },
                Err(e) => failures.push(format!("invalid content_id_pattern {}: {}", pattern, e)),
            }
        }

        if self.token_issued && !envelope.access_token().map(is_jwt_shaped).unwrap_or(false) {
            failures.push("expected a 3-segment jwt.accessToken".to_string());
        }

        for (pointer, want) in &self.body {
            match envelope.pointer(pointer) {
                Some(got) if got == want => {}
                Some(got) => failures.push(format!("{}: expected {}, got {}", pointer, want, got)),
                None => failures.push(format!("{}: missing, expected {}", pointer, want)),
            }
        }

        let rows = envelope.rows();
        if let Some(count) = self.row_count {
            if rows.len() != count {
                failures.push(format!("expected {} row(s), got {}", count, rows.len()));
            }
        }
        if let Some(row_id) = &self.contains_row {
            let found = rows
                .iter()
                .any(|row| row.get("content_row_id").and_then(Value::as_str) == Some(row_id.as_str()));
            if !found {
                failures.push(format!("no row with content_row_id {}", row_id));
            }
        }

        failures
    }

    /// Resolve `${name.field}` references in the string-valued assertions
    pub fn interpolate(&self, captures: &Captures) -> ContractResult<Self> {
        let mut out = self.clone();
        if let Some(row_id) = &self.contains_row {
            out.contains_row = Some(captures.interpolate(row_id)?);
        }
        if let Some(needle) = &self.message_contains {
            out.message_contains = Some(captures.interpolate(needle)?);
        }
        out.body = self
            .body
            .iter()
            .map(|(k, v)| Ok((k.clone(), captures.interpolate_value(v)?)))
            .collect::<ContractResult<_>>()?;
        Ok(out)
    }
}

/// Values captured by `save_as`, keyed `name.field`
#[derive(Debug, Clone, Default)]
pub struct Captures {
    vars: HashMap<String, String>,
}

/// `${name.field}` reference inside a suite string
static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").expect("static pattern"));

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, field: &str, value: impl Into<String>) {
        self.vars.insert(format!("{}.{}", name, field), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Replace every `${key}`; an unknown key is an error
    pub fn interpolate(&self, input: &str) -> ContractResult<String> {
        let re = &*REFERENCE_RE;
        if let Some(missing) = re
            .captures_iter(input)
            .map(|c| c[1].to_string())
            .find(|key| !self.vars.contains_key(key))
        {
            return Err(ContractError::StepFailed {
                step: input.to_string(),
                reason: format!("unknown reference ${{{}}}", missing),
            });
        }
        Ok(re
            .replace_all(input, |c: &regex::Captures<'_>| self.vars[&c[1]].clone())
            .into_owned())
    }

    /// Interpolate every string inside a JSON value
    pub fn interpolate_value(&self, value: &Value) -> ContractResult<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.interpolate(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.interpolate_value(v))
                    .collect::<ContractResult<_>>()?,
            ),
            Value::Object(map) => Value::Object(self.interpolate_payload(map)?),
            other => other.clone(),
        })
    }

    pub fn interpolate_payload(&self, payload: &Payload) -> ContractResult<Payload> {
        payload
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.interpolate_value(v)?)))
            .collect()
    }
}

impl ContractSuite {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> ContractResult<Self> {
        serde_yaml::from_str(yaml).map_err(ContractError::from)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> ContractResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| ContractError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, ordered by path
    pub fn load_all(dir: &Path) -> ContractResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Filter suites by tag
    pub fn filter_by_tag<'a>(suites: &'a [Self], tag: &str) -> Vec<&'a Self> {
        suites.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}
