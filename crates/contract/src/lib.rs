//! QBank Contract Test Harness
//!
//! This crate provides the command layer used by contract tests against the
//! question-authoring content API:
//! - Caches the login credential in an explicit, per-suite session context
//! - Composes request bodies from named fixtures plus override patches
//! - Executes requests and normalizes every response, 4xx/5xx included
//! - Verifies persisted state with bounded read-after-write polling
//! - Runs declarative YAML suites and writes JSON reports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ContractRunner (suites/*.yaml)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ContentClient (command registry)                           │
//! │    ├── login / login_and_cache ─────► SessionContext        │
//! │    ├── questions(type).create[_from_fixture]                │
//! │    ├── questions(type).update[_from_fixture]                │
//! │    └── get(content_id, GetOptions)                          │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  PayloadComposer         │  Executor                        │
//! │    fixture + Override    │    RequestDescriptor             │
//! │    (Set / Remove)        │      -> ResponseEnvelope         │
//! │                          │    transport errors only as Err  │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │  StateVerifier (verify / verify_fields, PollPolicy)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod content;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod fixture;
pub mod runner;
pub mod session;
pub mod suite;
pub mod verifier;

pub use commands::{CallOptions, ContentClient, GetOptions, QuestionCommands, UpdateOptions};
pub use config::HarnessConfig;
pub use content::QuestionType;
pub use envelope::{Body, CreatedContent, ResponseEnvelope};
pub use error::{ContractError, ContractResult, TransportKind};
pub use executor::{AuthMode, Executor, RequestDescriptor};
pub use fixture::{Override, Patch, Payload, PayloadComposer};
pub use runner::ContractRunner;
pub use session::{LoginRequest, Session, SessionContext};
pub use suite::{ContractStep, ContractSuite, Expectation};
pub use verifier::{PollPolicy, StateVerifier, VerificationResult};
