//! MongoDB connector
//!
//! Builds one `mongodb::Client` and verifies it with a `ping` before handing
//! it back. The driver connects lazily, so without the ping a bad URI or an
//! unreachable server would only surface on the first request.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;

use super::{Database, DbError};
use crate::config::DatabaseConfig;

/// Connected MongoDB client
#[derive(Clone)]
pub struct MongoDatabase {
    client: Client,
    host: String,
}

/// Open the client described by `config` and ping it once.
///
/// # Errors
///
/// `DbError::MissingUri` when no URI is configured, `DbError::Mongo` when the
/// URI does not parse or the server cannot be selected within the timeout.
pub async fn connect(config: &DatabaseConfig) -> Result<MongoDatabase, DbError> {
    let uri = config.uri.as_deref().ok_or(DbError::MissingUri)?;

    let mut options = ClientOptions::parse(uri).await?;
    if options.app_name.is_none() {
        options.app_name = Some(config.app_name.clone());
    }
    // A timeout given in the URI wins
    if options.server_selection_timeout.is_none() {
        options.server_selection_timeout = Some(config.connect_timeout);
    }

    let host = options
        .hosts
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown".to_string());

    let client = Client::with_options(options)?;
    client.database("admin").run_command(doc! { "ping": 1 }).await?;

    Ok(MongoDatabase { client, host })
}

#[async_trait]
impl Database for MongoDatabase {
    fn host(&self) -> &str {
        &self.host
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }

    fn client(&self) -> Option<&Client> {
        Some(&self.client)
    }
}
