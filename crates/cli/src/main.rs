//! QBank Contract CLI - Main Entry Point
//!
//! Runs declarative contract suites against the content service, composes
//! fixture payloads for inspection and checks that login works.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use qbank_contract::HarnessConfig;
use tracing::debug;

mod commands;
mod output;

use commands::{compose, login, run};

/// Exit code when the harness itself failed (config, transport, parse)
const EXIT_HARNESS_ERROR: u8 = 2;

/// QBank Contract - contract tests for the question-authoring API
#[derive(Parser)]
#[command(name = "qbank-contract")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file (TOML)
    #[arg(long, global = true, env = "QBANK_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the content service
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Fixture directory
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run contract suites
    Run(run::RunArgs),

    /// Print the payload composed from a fixture and overrides
    Compose(compose::ComposeArgs),

    /// Log in with the configured credentials
    Login(login::LoginArgs),
}

impl Cli {
    /// File, then `QBANK_*` environment, then command-line flags
    fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
        let base = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => HarnessConfig::default(),
        };
        let mut config = base.with_env_overrides()?;
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(dir) = &self.fixtures {
            config.fixtures_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(EXIT_HARNESS_ERROR)
        }
    }
}

async fn execute(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = cli.harness_config()?;
    debug!(
        "Harness configured: base_url={} fixtures={}",
        config.base_url,
        config.fixtures_dir.display()
    );

    match &cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Compose(args) => compose::execute(args, &config, cli.format),
        Commands::Login(args) => login::execute(args, &config, cli.format).await,
    }
}
