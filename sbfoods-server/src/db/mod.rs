//! Database layer - connector and process-wide handle
//!
//! # Design Principles
//!
//! - One client per process, created at startup and closed on shutdown
//! - The driver pools connections internally - no extra locking here
//! - Connect failures come back as `DbError`; only the binary decides to exit
//! - Handlers see the handle through `DatabaseSlot`, which stays empty until
//!   the startup connect completes

pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

pub use mongo::{connect, MongoDatabase};

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("MONGODB_URI is not set")]
    MissingUri,

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Database is not connected")]
    NotConnected,

    #[error("Connection string names no default database")]
    NoDefaultDatabase,
}

/// A live document database connection.
///
/// Implemented by [`MongoDatabase`] in production; tests supply their own.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Host the client is connected to (for logs)
    fn host(&self) -> &str;

    /// Round-trip check against the server
    async fn ping(&self) -> Result<(), DbError>;

    /// Release the connection. Called once, during shutdown.
    async fn close(&self);

    /// Driver client for collaborators that run queries.
    /// `None` unless the connection is backed by MongoDB.
    fn client(&self) -> Option<&mongodb::Client> {
        None
    }
}

/// Set-once holder for the process-wide database handle
#[derive(Clone)]
pub struct DatabaseSlot {
    inner: Arc<OnceCell<Arc<dyn Database>>>,
}

impl DatabaseSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(OnceCell::new()),
        }
    }

    /// Store the connected handle. Returns `false` if one was already installed.
    pub fn install(&self, db: Arc<dyn Database>) -> bool {
        self.inner.set(db).is_ok()
    }

    pub fn get(&self) -> Option<Arc<dyn Database>> {
        self.inner.get().cloned()
    }

    /// Handle for request handlers; errors while startup connect is pending
    pub fn require(&self) -> Result<Arc<dyn Database>, DbError> {
        self.get().ok_or(DbError::NotConnected)
    }

    /// Default database from the connection string, for collaborator queries
    pub fn default_database(&self) -> Result<mongodb::Database, DbError> {
        self.require()?
            .client()
            .and_then(mongodb::Client::default_database)
            .ok_or(DbError::NoDefaultDatabase)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.initialized()
    }

    /// Close the installed handle, if any. Returns whether anything was closed.
    pub async fn close(&self) -> bool {
        match self.get() {
            Some(db) => {
                db.close().await;
                true
            }
            None => false,
        }
    }
}

impl Default for DatabaseSlot {
    fn default() -> Self {
        Self::new()
    }
}
