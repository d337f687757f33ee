//! Embedded key-value token backend
//!
//! Stores the JSON-encoded token under `token:<app_key>` in a `sled`
//! database directory (`sled://path/to/dir`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sled::Db;

use super::{check_owner, persistence, Backend, BackendUri};
use crate::auth::token::Token;
use crate::error::{CobeeError, Result};

/// Token storage backed by an embedded `sled` database.
pub struct SledBackend {
    db: Db,
    path: PathBuf,
    app_key: String,
    key: String,
}

/// Registry constructor for `sled://` URIs.
pub fn factory(uri: &BackendUri, app_key: &str) -> Result<Box<dyn Backend>> {
    if uri.location.is_empty() {
        return Err(CobeeError::InvalidBackendUri(format!(
            "{} (missing database directory)",
            uri.raw
        ))
        .into());
    }
    Ok(Box::new(SledBackend::new(&uri.location, app_key)?))
}

impl SledBackend {
    /// Open or create a sled database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `CobeeError::BackendPersistence` if the database cannot be
    /// opened (for example when another process holds its lock).
    pub fn new(path: impl AsRef<Path>, app_key: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path).map_err(persistence("Failed to open database"))?;
        Ok(Self {
            db,
            path,
            app_key: app_key.to_string(),
            key: format!("token:{app_key}"),
        })
    }
}

#[async_trait]
impl Backend for SledBackend {
    async fn ensure_schema(&self) -> Result<()> {
        // sled creates its tree on open; nothing else to set up.
        Ok(())
    }

    async fn load(&self) -> Result<Option<Token>> {
        match self
            .db
            .get(self.key.as_bytes())
            .map_err(persistence("Get failed"))?
        {
            Some(bytes) => {
                let token = serde_json::from_slice(&bytes)
                    .map_err(persistence("Deserialization failed"))?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, token: &Token) -> Result<()> {
        check_owner(&self.app_key, token)?;
        let value = serde_json::to_vec(token).map_err(persistence("Serialization failed"))?;

        self.db
            .insert(self.key.as_bytes(), value)
            .map_err(persistence("Insert failed"))?;

        self.db.flush().map_err(persistence("Flush failed"))?;

        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.db
            .remove(self.key.as_bytes())
            .map_err(persistence("Remove failed"))?;
        self.db.flush().map_err(persistence("Flush failed"))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sled ({})", self.path.display())
    }
}
