//! Suite runner: executes declarative suites against the content service

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::commands::{CallOptions, ContentClient, GetOptions, UpdateOptions};
use crate::config::HarnessConfig;
use crate::envelope::ResponseEnvelope;
use crate::error::{ContractError, ContractResult};
use crate::executor::Executor;
use crate::fixture::{Override, Payload, PayloadComposer};
use crate::session::{LoginRequest, SessionContext};
use crate::suite::{BodySpec, Captures, ContractStep, ContractSuite, StepAuth};
use crate::verifier::{verify_fields_eventually, HttpStateVerifier, PollPolicy};

/// Bearer value sent by steps declaring `auth: invalid`
pub const INVALID_BEARER: &str = "invalid.bearer.token";

/// Result of running a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub label: String,
    pub success: bool,
    /// HTTP status, when the step made a call
    pub status: Option<u16>,
    pub duration_ms: u64,
    /// Violated expectations
    pub failures: Vec<String>,
    /// Harness-level error (transport, fixture, reference)
    pub error: Option<String>,
}

/// Result of running a single suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepReport>,
    pub error: Option<String>,
}

/// Result of running all suites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub suites: Vec<SuiteReport>,
}

impl RunReport {
    pub fn from_suites(suites: Vec<SuiteReport>, duration_ms: u64) -> Self {
        let passed = suites.iter().filter(|s| s.success).count();
        Self {
            total: suites.len(),
            passed,
            failed: suites.len() - passed,
            duration_ms,
            suites,
        }
    }
}

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub harness: HarnessConfig,
    pub suites_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Suites allowed in flight at once; steps within a suite never overlap
    pub concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            harness: HarnessConfig::default(),
            suites_dir: PathBuf::from("suites"),
            output_dir: PathBuf::from("test-results"),
            concurrency: 4,
        }
    }
}

/// Main contract suite runner
pub struct ContractRunner {
    config: RunnerConfig,
    composer: PayloadComposer,
}

impl ContractRunner {
    /// Create a new runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner reading fixtures from the configured directory
    pub fn with_config(config: RunnerConfig) -> Self {
        let composer = PayloadComposer::from_dir(&config.harness.fixtures_dir);
        Self { config, composer }
    }

    /// Replace the fixture source
    pub fn with_composer(mut self, composer: PayloadComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run all suites in the suites directory
    pub async fn run_all(&self) -> ContractResult<RunReport> {
        let suites = ContractSuite::load_all(&self.config.suites_dir)?;
        Ok(self.run_suites(&suites).await)
    }

    /// Run suites carrying a tag
    pub async fn run_tagged(&self, tag: &str) -> ContractResult<RunReport> {
        let suites = ContractSuite::load_all(&self.config.suites_dir)?;
        let filtered: Vec<ContractSuite> = ContractSuite::filter_by_tag(&suites, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_suites(&filtered).await)
    }

    /// Run a specific suite by name
    pub async fn run_named(&self, name: &str) -> ContractResult<SuiteReport> {
        let suites = ContractSuite::load_all(&self.config.suites_dir)?;
        let suite = suites
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ContractError::SpecParse(format!("Suite not found: {}", name)))?;
        Ok(self.run_suite(&suite).await)
    }

    /// Run suites, up to `concurrency` at a time, reporting in input order
    pub async fn run_suites(&self, suites: &[ContractSuite]) -> RunReport {
        let start = Instant::now();
        info!("Running {} suite(s)...", suites.len());

        let mut reports: Vec<(usize, SuiteReport)> = stream::iter(suites.iter().enumerate())
            .map(move |(i, suite)| async move { (i, self.run_suite(suite).await) })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        reports.sort_by_key(|(i, _)| *i);

        let report = RunReport::from_suites(
            reports.into_iter().map(|(_, r)| r).collect(),
            start.elapsed().as_millis() as u64,
        );
        info!(
            "Suite results: {} passed, {} failed ({} ms)",
            report.passed, report.failed, report.duration_ms
        );
        report
    }

    /// Run a single suite with its own session
    pub async fn run_suite(&self, suite: &ContractSuite) -> SuiteReport {
        let start = Instant::now();
        debug!("Running suite: {}", suite.name);

        let client = match Executor::new(&self.config.harness, SessionContext::new()) {
            Ok(executor) => ContentClient::new(executor, self.composer.clone()),
            Err(e) => {
                error!("✗ {} - {}", suite.name, e);
                return SuiteReport {
                    name: suite.name.clone(),
                    success: false,
                    duration_ms: 0,
                    steps: vec![],
                    error: Some(e.to_string()),
                };
            }
        };

        let mut execution = SuiteExecution {
            client,
            harness: &self.config.harness,
            captures: Captures::new(),
        };

        let mut steps = Vec::new();
        let mut suite_error = None;

        for (index, step) in suite.steps.iter().enumerate() {
            let report = execution.run_step(index, step).await;
            let success = report.success;
            if !success {
                suite_error = Some(format!(
                    "step {} ({}) failed: {}",
                    index,
                    report.label,
                    report.error.clone().unwrap_or_else(|| report.failures.join("; "))
                ));
            }
            steps.push(report);
            if !success {
                break; // Stop on first failure
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match &suite_error {
            None => info!("✓ {} ({} ms)", suite.name, duration_ms),
            Some(e) => error!("✗ {} - {}", suite.name, e),
        }

        SuiteReport {
            name: suite.name.clone(),
            success: suite_error.is_none(),
            duration_ms,
            steps,
            error: suite_error,
        }
    }

    /// Write the run report to `<output_dir>/test-results.json`
    pub fn write_report(&self, report: &RunReport) -> ContractResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for ContractRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-suite state: one client, one session, captured identifiers
struct SuiteExecution<'a> {
    client: ContentClient,
    harness: &'a HarnessConfig,
    captures: Captures,
}

impl SuiteExecution<'_> {
    async fn run_step(&mut self, index: usize, step: &ContractStep) -> StepReport {
        let start = Instant::now();
        let label = step.label();
        debug!("Executing step {}: {}", index, label);

        let outcome = match self.execute(step).await {
            Ok(envelope) => match (envelope, step.expectation()) {
                (Some(envelope), Some(expect)) => expect
                    .interpolate(&self.captures)
                    .map(|expect| (Some(envelope.status), expect.check(&envelope))),
                (envelope, _) => Ok((envelope.map(|e| e.status), Vec::new())),
            },
            Err(e) => Err(e),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok((status, failures)) => StepReport {
                index,
                label,
                success: failures.is_empty(),
                status,
                duration_ms,
                failures,
                error: None,
            },
            Err(e) => StepReport {
                index,
                label,
                success: false,
                status: None,
                duration_ms,
                failures: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    async fn execute(&mut self, step: &ContractStep) -> ContractResult<Option<ResponseEnvelope>> {
        let payload = match step.body() {
            Some(body) => self.compose(body)?,
            None => Payload::new(),
        };

        match step {
            ContractStep::Login {
                username,
                password,
                product_id,
                device_id,
                cache,
                ..
            } => {
                let defaults = &self.harness.credentials;
                let request = LoginRequest {
                    username: username.clone().unwrap_or_else(|| defaults.username.clone()),
                    password: password.clone().unwrap_or_else(|| defaults.password.clone()),
                    product_id: product_id.clone().or_else(|| defaults.product_id.clone()),
                    device_id: device_id.clone().or_else(|| defaults.device_id.clone()),
                };
                let envelope = if *cache {
                    self.client.login_and_cache(&request).await?
                } else {
                    self.client.login(&request).await?
                };
                Ok(Some(envelope))
            }

            ContractStep::Create {
                question_type,
                auth,
                save_as,
                ..
            } => {
                let envelope = self
                    .client
                    .questions(*question_type)
                    .create_with(&payload, &call_options(*auth))
                    .await?;
                if let Some(name) = save_as {
                    self.capture(name, &envelope, None);
                }
                Ok(Some(envelope))
            }

            ContractStep::Update {
                question_type,
                content_id,
                create_new_version,
                content_row_id,
                auth,
                save_as,
                ..
            } => {
                let content_id = self.captures.interpolate(content_id)?;
                let options = UpdateOptions {
                    create_new_version: *create_new_version,
                    content_row_id: content_row_id
                        .as_deref()
                        .map(|r| self.captures.interpolate(r))
                        .transpose()?,
                    call: call_options(*auth),
                };
                let envelope = self
                    .client
                    .questions(*question_type)
                    .update(&content_id, &payload, &options)
                    .await?;
                if let Some(name) = save_as {
                    self.capture(name, &envelope, Some(content_id.as_str()));
                }
                Ok(Some(envelope))
            }

            ContractStep::Get {
                content_id,
                languages,
                encryption,
                auth,
                ..
            } => {
                let content_id = self.captures.interpolate(content_id)?;
                let options = GetOptions {
                    languages: languages.clone(),
                    encryption: *encryption,
                    call: call_options(*auth),
                };
                Ok(Some(self.client.get(&content_id, &options).await?))
            }

            ContractStep::Verify {
                content_id,
                row_id,
                fields,
                attempts,
            } => {
                let content_id = self.captures.interpolate(content_id)?;
                let mut verifier = HttpStateVerifier::new(self.client.clone());
                if let Some(row_id) = row_id {
                    verifier = verifier.for_row(self.captures.interpolate(row_id)?);
                }
                let mut policy = PollPolicy::from(&self.harness.verifier);
                if let Some(attempts) = attempts {
                    policy.attempts = (*attempts).max(1);
                }
                let expected = self.captures.interpolate_payload(fields)?;
                let result = verify_fields_eventually(&verifier, &content_id, &expected, policy).await?;
                if !result.is_consistent() {
                    let details: Vec<String> = result
                        .mismatches
                        .iter()
                        .map(|m| match &m.actual {
                            Some(actual) => format!("{}: expected {}, got {}", m.field, m.expected, actual),
                            None => format!("{}: expected {}, missing", m.field, m.expected),
                        })
                        .collect();
                    return Err(ContractError::AssertionFailed(format!(
                        "{} persisted state differs: {}",
                        content_id,
                        details.join("; ")
                    )));
                }
                Ok(None)
            }

            ContractStep::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }

            ContractStep::Log { message } => {
                info!("{}", self.captures.interpolate(message)?);
                Ok(None)
            }
        }
    }

    /// Build the request body: fixture (or literal payload), then overrides
    fn compose(&self, body: BodySpec<'_>) -> ContractResult<Payload> {
        let set = self.captures.interpolate_payload(body.set)?;
        let patch = Override::from_parts(set, body.remove.iter().cloned());
        match (body.fixture, body.payload) {
            (Some(fixture), _) => self.client.composer().compose(fixture, &patch),
            (None, Some(payload)) => Ok(patch.apply(&self.captures.interpolate_payload(payload)?)),
            (None, None) => Ok(patch.apply(&Payload::new())),
        }
    }

    /// Remember the identifiers of a successful create/update under `name`
    fn capture(&mut self, name: &str, envelope: &ResponseEnvelope, fallback_id: Option<&str>) {
        if !envelope.is_success() {
            return;
        }
        let content_id = envelope
            .pointer("/content_id")
            .and_then(|v| v.as_str())
            .or(fallback_id);
        if let Some(id) = content_id {
            self.captures.insert(name, "content_id", id);
        }
        if let Some(row_id) = envelope.pointer("/content_row_id").and_then(|v| v.as_str()) {
            self.captures.insert(name, "content_row_id", row_id);
        }
    }
}

fn call_options(auth: StepAuth) -> CallOptions {
    match auth {
        StepAuth::Session => CallOptions::default(),
        StepAuth::Anonymous => CallOptions::anonymous(),
        StepAuth::Invalid => CallOptions::bearer(INVALID_BEARER),
    }
}
