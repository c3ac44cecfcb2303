//! TrustMeter native messaging host
//!
//! Launched by the browser for the TrustMeter extension. Speaks length-prefixed
//! JSON on stdio and runs the request coordinator in-process.

mod framing;
mod logging;
mod protocol;
mod runtime;
mod tab_host;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use trustmeter_core::{BackendClient, TrustMeterConfig};

#[derive(Parser, Debug)]
#[command(name = "trustmeter-host", author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/trustmeter/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the analysis backend base URL
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// trace, debug, info, warn, error or off
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Probe the backend's /health endpoint, print the report and exit
    #[arg(long)]
    check_health: bool,

    /// Arguments the browser appends when launching the host (extension origin,
    /// parent window handle).
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    browser_args: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<TrustMeterConfig> {
    let mut config =
        TrustMeterConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = &cli.backend_url {
        config.backend.base_url = url.trim().to_string();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn check_health(client: &BackendClient) -> Result<()> {
    let report = client
        .health()
        .await
        .with_context(|| format!("Backend at {} is not healthy", client.base_url()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let level = logging::init_logging(&config.logging.level)?;

    let client = BackendClient::new(&config.backend);
    if cli.check_health {
        return check_health(&client).await;
    }

    info!(
        "TrustMeter host starting: backend={}, log_level={}, caller={}",
        client.base_url(),
        logging::level_to_str(level),
        cli.browser_args.first().map(String::as_str).unwrap_or("-")
    );

    let runtime = runtime::HostRuntime::new(Arc::new(client), &config);
    runtime
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("Native messaging host stopped")?;

    info!("TrustMeter host stopped");
    Ok(())
}
