//! Harness configuration
//!
//! Base URL, credentials and identifiers are owned by the environment; the
//! command layer only ever sees them as opaque values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ContractError, ContractResult};

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the content service (scheme + host, optional prefix)
    pub base_url: String,

    /// Login credentials for the suite session
    pub credentials: Credentials,

    /// Upper bound for every HTTP call, in seconds
    pub request_timeout_secs: u64,

    /// Directory holding fixture documents
    pub fixtures_dir: PathBuf,

    /// Read-after-write polling
    pub verifier: VerifierConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            credentials: Credentials::default(),
            request_timeout_secs: 30,
            fixtures_dir: PathBuf::from("fixtures"),
            verifier: VerifierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub product_id: Option<String>,
    pub device_id: Option<String>,
}

/// Bounded polling used by the state verifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval_ms: 200,
        }
    }
}

impl VerifierConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    ///
    /// Not validated: later layers may still replace values, so callers run
    /// [`HarnessConfig::validate`] once everything is applied.
    pub fn from_file(path: &Path) -> ContractResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Build and validate configuration from `QBANK_*` variables over defaults
    pub fn from_env() -> ContractResult<Self> {
        let config = Self::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QBANK_*` environment variables on top of this configuration.
    ///
    /// Only a value that cannot be parsed at all is an error here.
    pub fn with_env_overrides(mut self) -> ContractResult<Self> {
        if let Some(v) = env_var("QBANK_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = env_var("QBANK_USERNAME") {
            self.credentials.username = v;
        }
        if let Some(v) = env_var("QBANK_PASSWORD") {
            self.credentials.password = v;
        }
        if let Some(v) = env_var("QBANK_PRODUCT_ID") {
            self.credentials.product_id = Some(v);
        }
        if let Some(v) = env_var("QBANK_DEVICE_ID") {
            self.credentials.device_id = Some(v);
        }
        if let Some(v) = env_var("QBANK_FIXTURES_DIR") {
            self.fixtures_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("QBANK_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v.parse().map_err(|_| {
                ContractError::InvalidConfig(format!("QBANK_REQUEST_TIMEOUT_SECS is not a number: {}", v))
            })?;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check the values the command layer relies on
    pub fn validate(&self) -> ContractResult<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ContractError::InvalidConfig(format!("base_url {}: {}", self.base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ContractError::InvalidConfig(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ContractError::InvalidConfig("request_timeout_secs must be > 0".into()));
        }
        if self.verifier.attempts == 0 {
            return Err(ContractError::InvalidConfig("verifier.attempts must be > 0".into()));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .and_then(|v| if v.trim().is_empty() { None } else { Some(v) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
base_url = "https://qa.example.com"
request_timeout_secs = 10

[credentials]
username = "author"
password = "secret"
product_id = "P1"

[verifier]
attempts = 3
"#;
        let config: HarnessConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.credentials.product_id.as_deref(), Some("P1"));
        assert_eq!(config.credentials.device_id, None);
        assert_eq!(config.verifier.attempts, 3);
        assert_eq!(config.verifier.interval_ms, 200);
        assert_eq!(config.fixtures_dir, PathBuf::from("fixtures"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = HarnessConfig {
            base_url: "ftp://example.com".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ContractError::InvalidConfig(_))));

        let config = HarnessConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HarnessConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_layer_is_not_validated_on_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("qbank.toml");
        std::fs::write(&path, "base_url = \"ftp://stale-host\"\nrequest_timeout_secs = 5\n").unwrap();

        let mut config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.request_timeout_secs, 5);
        assert!(config.validate().is_err());

        config.base_url = "https://qa.example.com".into();
        assert!(config.validate().is_ok());
    }
}
