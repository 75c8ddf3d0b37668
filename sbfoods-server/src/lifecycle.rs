//! Process lifecycle: bind, serve, fail fast on the database, shut down on signal
//!
//! The database connect runs concurrently with the listener. Once serving,
//! [`serve`] waits on three things at once:
//!
//! - the connect task: success fills the database slot, failure ends serving
//!   with an error
//! - the shutdown future: closes the database and returns `Ok(())`
//! - the server itself, which only ends on an I/O failure
//!
//! Shutdown does not drain in-flight requests before closing the database.
//! A handler still running at that point may fail mid-request.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};

use crate::config::{AppConfig, DatabaseConfig};
use crate::db::{self, Database, DbError};
use crate::middleware::rate_limit;
use crate::routes::{Collaborators, HEALTH_PATH};
use crate::state::AppContext;

/// Lifecycle errors. Any of these means exit code 1.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Database connection error: {0}")]
    Database(#[from] DbError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Database connect task failed: {0}")]
    ConnectTask(#[from] JoinError),
}

/// In-flight startup connect
pub type Connecting = JoinHandle<Result<Arc<dyn Database>, DbError>>;

/// Why the process is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Terminate,
    Interrupt,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Interrupt => f.write_str("SIGINT"),
        }
    }
}

/// Run the API until a termination signal or a fatal error.
///
/// Startup order: database connect spawned, routes and pipeline built,
/// listener bound, banner logged.
pub async fn run(config: AppConfig, collaborators: Collaborators) -> Result<(), LifecycleError> {
    let ctx = AppContext::new(config);
    let connecting = spawn_connect(ctx.config().database.clone());
    let app = crate::build_router(&ctx, collaborators);

    let addr = ctx.config().bind_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(source) => {
            connecting.abort();
            return Err(LifecycleError::Bind { addr, source });
        }
    };

    serve(listener, ctx, app, connecting, shutdown_signal()).await
}

/// Start the MongoDB connect in the background
pub fn spawn_connect(config: DatabaseConfig) -> Connecting {
    tokio::spawn(async move {
        let database = db::connect(&config).await?;
        Ok(Arc::new(database) as Arc<dyn Database>)
    })
}

/// Serve `app` on `listener` until `shutdown` resolves or something fails.
pub async fn serve<F>(
    listener: TcpListener,
    ctx: AppContext,
    app: Router,
    mut connecting: Connecting,
    shutdown: F,
) -> Result<(), LifecycleError>
where
    F: Future<Output = ShutdownSignal>,
{
    let port = listener.local_addr().map_err(LifecycleError::Serve)?.port();
    let sweeper = rate_limit::spawn_sweeper(ctx.clone());

    tracing::info!("SB Foods API Server running on port {port}");
    tracing::info!("Environment: {}", ctx.config().environment);
    tracing::info!("Health check: http://localhost:{port}{HEALTH_PATH}");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .into_future();
    tokio::pin!(server);
    tokio::pin!(shutdown);

    let mut connect_pending = true;

    let outcome = loop {
        tokio::select! {
            joined = &mut connecting, if connect_pending => {
                connect_pending = false;
                match joined {
                    Ok(Ok(database)) => {
                        tracing::info!("MongoDB Connected: {}", database.host());
                        if !ctx.database().install(database) {
                            tracing::warn!("database slot already filled, keeping the existing handle");
                        }
                    }
                    Ok(Err(err)) => {
                        tracing::error!("Database connection error: {err}");
                        break Err(LifecycleError::Database(err));
                    }
                    Err(err) => {
                        tracing::error!("Database connect task failed: {err}");
                        break Err(LifecycleError::ConnectTask(err));
                    }
                }
            }
            signal = &mut shutdown => {
                tracing::info!("{signal} received. Shutting down gracefully...");
                if connect_pending {
                    connecting.abort();
                }
                if ctx.database().close().await {
                    tracing::info!("MongoDB connection closed.");
                } else {
                    tracing::info!("No database connection to close.");
                }
                break Ok(());
            }
            result = &mut server => {
                break result.map_err(|err| {
                    tracing::error!("Server error: {err}");
                    LifecycleError::Serve(err)
                });
            }
        }
    };

    sweeper.abort();
    outcome
}

/// Wait for SIGTERM or Ctrl+C.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => ShutdownSignal::Interrupt,
        _ = terminate => ShutdownSignal::Terminate,
    }
}
