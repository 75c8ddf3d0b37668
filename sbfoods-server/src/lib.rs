//! sbfoods-server: HTTP shell of the SB Foods food-ordering API
//!
//! Wires security headers, compression, rate limiting, CORS, body parsing,
//! request logging and static uploads in front of the health route and the
//! seven resource groups, connects MongoDB, and shuts down on SIGTERM.
//!
//! ```no_run
//! use sbfoods_server::{lifecycle, AppConfig, Collaborators};
//!
//! # async fn start() -> Result<(), sbfoods_server::LifecycleError> {
//! lifecycle::run(AppConfig::default(), Collaborators::new()).await
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod state;

use axum::Router;

pub use config::{AppConfig, ConfigError, Environment};
pub use db::{Database, DatabaseSlot, DbError};
pub use error::{ApiError, ApiResult};
pub use lifecycle::LifecycleError;
pub use middleware::ParsedBody;
pub use routes::{Collaborators, Resource};
pub use state::AppContext;

/// Build the full application: routes, not-found fallback, then the
/// request pipeline around them.
pub fn build_router(ctx: &AppContext, collaborators: Collaborators) -> Router {
    let routes = routes::api_router(collaborators).with_state(ctx.clone());
    pipeline::apply(routes, ctx)
}
