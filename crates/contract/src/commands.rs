//! Command registry: the operations test code calls
//!
//! Every command resolves to a [`ResponseEnvelope`]; the body is handed back
//! exactly as the service sent it.
//!
//! ```text
//! ContentClient
//!   ├── login / login_and_cache      (session)
//!   ├── get(content_id, GetOptions)
//!   └── questions(type) -> QuestionCommands
//!         ├── create / create_with / create_from_fixture
//!         └── update / update_from_fixture   {create_new_version, content_details}
//! ```

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::content::{item_path, question_path, questions_path, QuestionType};
use crate::envelope::ResponseEnvelope;
use crate::error::ContractResult;
use crate::executor::{AuthMode, Executor, RequestDescriptor};
use crate::fixture::{Override, Payload, PayloadComposer};
use crate::session::{self, LoginRequest, SessionContext};

/// Header carrying the retrieval encryption flag
pub const ENCRYPTION_HEADER: &str = "x-encryption";

/// Per-call modifiers shared by all commands
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub auth: AuthMode,
    pub headers: Vec<(String, String)>,
}

impl CallOptions {
    pub fn anonymous() -> Self {
        Self {
            auth: AuthMode::Anonymous,
            ..Default::default()
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth: AuthMode::Bearer(token.into()),
            ..Default::default()
        }
    }

    fn apply(&self, mut descriptor: RequestDescriptor) -> RequestDescriptor {
        for (name, value) in &self.headers {
            descriptor = descriptor.header(name.clone(), value.clone());
        }
        descriptor.auth(self.auth.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub create_new_version: bool,
    /// Row to target; embedded in `content_details` when set
    pub content_row_id: Option<String>,
    pub call: CallOptions,
}

impl UpdateOptions {
    pub fn in_place() -> Self {
        Self::default()
    }

    pub fn new_version() -> Self {
        Self {
            create_new_version: true,
            ..Default::default()
        }
    }

    pub fn with_row_id(mut self, row_id: impl Into<String>) -> Self {
        self.content_row_id = Some(row_id.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Comma-joined into the `languages` query parameter
    pub languages: Vec<String>,
    /// Sent as the `x-encryption` header when set
    pub encryption: Option<bool>,
    pub call: CallOptions,
}

impl GetOptions {
    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn encryption(mut self, enabled: bool) -> Self {
        self.encryption = Some(enabled);
        self
    }
}

/// Wire body of an update call
#[derive(Debug, Clone, Serialize)]
pub struct UpdateEnvelope {
    pub create_new_version: bool,
    pub content_details: Payload,
}

impl UpdateEnvelope {
    pub fn new(payload: &Payload, options: &UpdateOptions) -> Self {
        let mut content_details = payload.clone();
        if let Some(row_id) = &options.content_row_id {
            content_details.insert("content_row_id".to_string(), Value::String(row_id.clone()));
        }
        Self {
            create_new_version: options.create_new_version,
            content_details,
        }
    }
}

/// Entry point for test code: one executor, one session, one composer
#[derive(Clone)]
pub struct ContentClient {
    executor: Executor,
    composer: PayloadComposer,
}

impl ContentClient {
    pub fn new(executor: Executor, composer: PayloadComposer) -> Self {
        Self { executor, composer }
    }

    /// Client with a fresh session and fixtures read from `fixtures_dir`
    pub fn from_config(config: &HarnessConfig) -> ContractResult<Self> {
        let executor = Executor::new(config, SessionContext::new())?;
        Ok(Self::new(executor, PayloadComposer::from_dir(&config.fixtures_dir)))
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn session(&self) -> &SessionContext {
        self.executor.session()
    }

    pub fn composer(&self) -> &PayloadComposer {
        &self.composer
    }

    pub async fn login(&self, request: &LoginRequest) -> ContractResult<ResponseEnvelope> {
        session::login(&self.executor, request).await
    }

    pub async fn login_and_cache(&self, request: &LoginRequest) -> ContractResult<ResponseEnvelope> {
        session::login_and_cache(&self.executor, request).await
    }

    /// Commands for one question type
    pub fn questions(&self, question_type: QuestionType) -> QuestionCommands<'_> {
        QuestionCommands {
            client: self,
            question_type,
        }
    }

    /// Fetch every row of a content item
    pub async fn get(&self, content_id: &str, options: &GetOptions) -> ContractResult<ResponseEnvelope> {
        let mut descriptor = RequestDescriptor::get(item_path(content_id));
        if !options.languages.is_empty() {
            descriptor = descriptor.query("languages", options.languages.join(","));
        }
        if let Some(enabled) = options.encryption {
            descriptor = descriptor.header(ENCRYPTION_HEADER, enabled.to_string());
        }
        self.executor.execute(options.call.apply(descriptor)).await
    }
}

/// Create/update commands bound to a question type
pub struct QuestionCommands<'a> {
    client: &'a ContentClient,
    question_type: QuestionType,
}

impl QuestionCommands<'_> {
    pub fn question_type(&self) -> QuestionType {
        self.question_type
    }

    /// Send `payload` as-is
    pub async fn create(&self, payload: &Payload) -> ContractResult<ResponseEnvelope> {
        self.create_with(payload, &CallOptions::default()).await
    }

    pub async fn create_with(&self, payload: &Payload, call: &CallOptions) -> ContractResult<ResponseEnvelope> {
        debug!("create {} ({} fields)", self.question_type, payload.len());
        let descriptor = RequestDescriptor::post(questions_path(self.question_type))
            .json(Value::Object(payload.clone()));
        self.client.executor.execute(call.apply(descriptor)).await
    }

    /// Compose `fixture` with `patch`, then create
    pub async fn create_from_fixture(&self, fixture: &str, patch: &Override) -> ContractResult<ResponseEnvelope> {
        let payload = self.client.composer.compose(fixture, patch)?;
        self.create(&payload).await
    }

    /// Wrap `payload` under `content_details` and PUT it
    pub async fn update(
        &self,
        content_id: &str,
        payload: &Payload,
        options: &UpdateOptions,
    ) -> ContractResult<ResponseEnvelope> {
        debug!(
            "update {} {} (new version: {})",
            self.question_type, content_id, options.create_new_version
        );
        let body = serde_json::to_value(UpdateEnvelope::new(payload, options))?;
        let descriptor = RequestDescriptor::put(question_path(self.question_type, content_id)).json(body);
        self.client.executor.execute(options.call.apply(descriptor)).await
    }

    pub async fn update_from_fixture(
        &self,
        content_id: &str,
        fixture: &str,
        patch: &Override,
        options: &UpdateOptions,
    ) -> ContractResult<ResponseEnvelope> {
        let payload = self.client.composer.compose(fixture, patch)?;
        self.update(content_id, &payload, options).await
    }

    pub async fn get(&self, content_id: &str, options: &GetOptions) -> ContractResult<ResponseEnvelope> {
        self.client.get(content_id, options).await
    }
}
