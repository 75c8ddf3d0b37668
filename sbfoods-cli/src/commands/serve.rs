//! Run the SB Foods API
//!
//! Every option has an environment fallback so the server can be configured
//! from a `.env` file the same way as from flags.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use sbfoods_server::config::{parse_origins, DatabaseConfig, DEFAULT_PORT};
use sbfoods_server::{lifecycle, AppConfig, Collaborators, Environment};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Runtime environment: development, production, or anything else.
    /// Left unset, request logging is off and CORS uses the local origins.
    #[arg(long = "env", env = "NODE_ENV")]
    pub environment: Option<String>,

    /// MongoDB connection string
    #[arg(long, env = "MONGODB_URI", hide_env_values = true)]
    pub mongodb_uri: Option<String>,

    /// Comma separated origins allowed by CORS in production
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Directory served under /uploads
    #[arg(long, env = "UPLOADS_DIR", default_value = "uploads")]
    pub uploads_dir: PathBuf,

    /// Seconds to wait for MongoDB at startup (unless the URI sets its own)
    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 30)]
    pub db_connect_timeout: u64,
}

impl ServeArgs {
    pub fn into_config(self) -> Result<AppConfig> {
        let frontend_origins = match self.frontend_url.as_deref() {
            Some(raw) => parse_origins(raw).context("Invalid FRONTEND_URL")?,
            None => Vec::new(),
        };

        Ok(AppConfig {
            host: self.host,
            port: self.port,
            environment: Environment::from_name(self.environment.as_deref()),
            database: DatabaseConfig {
                uri: self.mongodb_uri.filter(|uri| !uri.trim().is_empty()),
                connect_timeout: Duration::from_secs(self.db_connect_timeout),
                ..DatabaseConfig::default()
            },
            frontend_origins,
            uploads_dir: self.uploads_dir,
            ..AppConfig::default()
        })
    }
}

/// Run the server until SIGTERM / Ctrl+C
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = args.into_config()?;

    tracing::debug!(
        bind = %config.bind_addr(),
        environment = %config.environment,
        uploads = %config.uploads_dir.display(),
        "starting SB Foods API"
    );

    lifecycle::run(config, Collaborators::new())
        .await
        .context("SB Foods API stopped")?;

    Ok(())
}
