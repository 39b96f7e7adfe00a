//! Login Command

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use qbank_contract::envelope::is_jwt_shaped;
use qbank_contract::{ContentClient, HarnessConfig, LoginRequest, ResponseEnvelope};

use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct LoginArgs {
    /// Username, instead of the configured one
    #[arg(long)]
    pub username: Option<String>,

    /// Password, instead of the configured one
    #[arg(long, env = "QBANK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long)]
    pub product_id: Option<String>,

    #[arg(long)]
    pub device_id: Option<String>,
}

/// What a login produced; the token itself is never shown
#[derive(Debug, Serialize)]
pub struct LoginOutcome {
    pub status: u16,
    pub token_issued: bool,
    pub message: Option<String>,
}

impl From<&ResponseEnvelope> for LoginOutcome {
    fn from(envelope: &ResponseEnvelope) -> Self {
        Self {
            status: envelope.status,
            token_issued: envelope.access_token().map(is_jwt_shaped).unwrap_or(false),
            message: envelope.message().map(str::to_string),
        }
    }
}

impl TableDisplay for LoginOutcome {
    fn headers() -> Vec<&'static str> {
        vec!["Status", "Token Issued", "Message"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.status.to_string(),
            if self.token_issued { "yes".into() } else { "no".into() },
            self.message.clone().unwrap_or_default(),
        ]
    }
}

fn login_request(args: &LoginArgs, config: &HarnessConfig) -> LoginRequest {
    let mut request = LoginRequest::from_credentials(&config.credentials);
    if let Some(username) = &args.username {
        request.username = username.clone();
    }
    if let Some(password) = &args.password {
        request.password = password.clone();
    }
    if let Some(product_id) = &args.product_id {
        request.product_id = Some(product_id.clone());
    }
    if let Some(device_id) = &args.device_id {
        request.device_id = Some(device_id.clone());
    }
    request
}

pub async fn execute(args: &LoginArgs, config: &HarnessConfig, format: OutputFormat) -> Result<ExitCode> {
    let client = ContentClient::from_config(config)?;
    let envelope = client.login(&login_request(args, config)).await?;

    let outcome = LoginOutcome::from(&envelope);
    print_item(&outcome, format);

    if envelope.status == 200 && outcome.token_issued {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
