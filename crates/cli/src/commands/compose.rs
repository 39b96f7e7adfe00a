//! Compose Command

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Args;
use serde_json::Value;

use qbank_contract::{ContractError, HarnessConfig, Override, PayloadComposer};

use crate::output::{print_document, OutputFormat};

#[derive(Args)]
pub struct ComposeArgs {
    /// Fixture name (file stem under the fixture directory)
    pub fixture: String,

    /// Set a key; the value is parsed as JSON, falling back to a string
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Remove a key
    #[arg(long = "remove", value_name = "KEY")]
    pub remove: Vec<String>,
}

/// Parse `key=value` where value is JSON, or a bare string
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got {:?}", raw);
    };
    if key.is_empty() {
        bail!("empty key in {:?}", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Sets apply first, then removals, in command-line order
pub fn build_override(args: &ComposeArgs) -> Result<Override> {
    let mut patch = Override::new();
    for raw in &args.set {
        let (key, value) = parse_assignment(raw)?;
        patch = patch.set(key, value);
    }
    for key in &args.remove {
        patch = patch.remove(key.as_str());
    }
    Ok(patch)
}

pub fn execute(args: &ComposeArgs, config: &HarnessConfig, format: OutputFormat) -> Result<ExitCode> {
    let composer = PayloadComposer::from_dir(&config.fixtures_dir);
    let payload = match composer.compose(&args.fixture, &build_override(args)?) {
        Err(ContractError::FixtureNotFound(name)) => {
            let known = composer.source().names().unwrap_or_default();
            bail!(
                "fixture {} not found in {} (available: {})",
                name,
                config.fixtures_dir.display(),
                known.join(", ")
            );
        }
        other => other?,
    };
    print_document(&payload, format);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("class=8").unwrap(), ("class".into(), json!(8)));
        assert_eq!(parse_assignment("stem=Hello there").unwrap(), ("stem".into(), json!("Hello there")));
        assert_eq!(parse_assignment("answers=[\"a\",\"b\"]").unwrap(), ("answers".into(), json!(["a", "b"])));
        assert_eq!(parse_assignment("subject=").unwrap(), ("subject".into(), json!("")));
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn test_build_override_applies_to_fixture() {
        let args = ComposeArgs {
            fixture: "mcq_valid".into(),
            set: vec!["stem=\"Changed\"".into(), "max_marks=2".into()],
            remove: vec!["answer".into()],
        };
        let base = json!({"stem": "Original", "answer": "b", "class": "8"})
            .as_object()
            .cloned()
            .unwrap();
        let payload = build_override(&args).unwrap().apply(&base);
        assert_eq!(payload["stem"], "Changed");
        assert_eq!(payload["max_marks"], 2);
        assert_eq!(payload["class"], "8");
        assert!(!payload.contains_key("answer"));
    }
}
