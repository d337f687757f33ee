//! Redis token backend
//!
//! Stores the JSON-encoded token under `cobee:token:<app_key>`.  A single
//! `SET` replaces the value, so a reader never observes a partial write.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{check_owner, persistence, Backend, BackendUri};
use crate::auth::token::Token;
use crate::error::Result;

/// Token storage backed by a Redis key.
pub struct RedisBackend {
    client: redis::Client,
    app_key: String,
    key: String,
    display: String,
}

/// Registry constructor for `redis://` URIs.
pub fn factory(uri: &BackendUri, app_key: &str) -> Result<Box<dyn Backend>> {
    Ok(Box::new(RedisBackend::new(&uri.raw, app_key)?))
}

impl RedisBackend {
    /// Creates a backend for the Redis server at `url`.
    ///
    /// No connection is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns `CobeeError::BackendPersistence` if `url` is not a valid
    /// Redis connection URL.
    pub fn new(url: &str, app_key: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(persistence("Invalid Redis URL"))?;
        Ok(Self {
            client,
            app_key: app_key.to_string(),
            key: Self::key_for(app_key),
            display: format!("redis ({})", redact_password(url)),
        })
    }

    fn key_for(app_key: &str) -> String {
        format!("cobee:token:{app_key}")
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(persistence("Failed to connect to Redis"))?;
        Ok(conn)
    }
}

/// Strips any password from `url` so it can be shown to the operator.
fn redact_password(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn ensure_schema(&self) -> Result<()> {
        // Keys need no schema; verify the server is reachable instead.
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(persistence("Redis PING failed"))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Token>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(persistence("Redis GET failed"))?;

        match value {
            Some(json) => {
                let token =
                    serde_json::from_str(&json).map_err(persistence("Deserialization failed"))?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, token: &Token) -> Result<()> {
        check_owner(&self.app_key, token)?;
        let json = serde_json::to_string(token).map_err(persistence("Serialization failed"))?;
        let mut conn = self.connection().await?;
        let _: () = conn
            .set(&self.key, json)
            .await
            .map_err(persistence("Redis SET failed"))?;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(&self.key)
            .await
            .map_err(persistence("Redis DEL failed"))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.display.clone()
    }
}
