//! Probe a running server's health endpoint (container health checks)

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;

use sbfoods_server::config::DEFAULT_PORT;
use sbfoods_server::routes::HEALTH_PATH;

/// Arguments for the health command
#[derive(Parser, Debug)]
pub struct HealthArgs {
    /// Health endpoint (default: http://localhost:$PORT/api/health)
    #[arg(long)]
    pub url: Option<String>,

    /// Port used for the default URL
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
}

impl HealthArgs {
    fn endpoint(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}{HEALTH_PATH}", self.port))
    }
}

/// GET the endpoint, print its JSON, fail unless it reports success
pub async fn run_health(args: HealthArgs) -> Result<()> {
    let url = args.endpoint();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .with_context(|| format!("{url} did not answer with JSON ({status})"))?;

    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() || body.get("success") != Some(&Value::Bool(true)) {
        bail!("SB Foods API is not healthy ({status})");
    }
    Ok(())
}
