//! Subcommands

pub mod health;
pub mod serve;

pub use health::{run_health, HealthArgs};
pub use serve::{run_serve, ServeArgs};
