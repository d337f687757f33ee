//! Process-local token backend
//!
//! Keeps the token in memory only.  Useful for tests and one-shot runs where
//! nothing should touch disk.  Clones share the same slot, so a test can keep
//! a handle and inspect what a `TokenManager` persisted.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{check_owner, Backend, BackendUri};
use crate::auth::token::Token;
use crate::error::{CobeeError, Result};

/// In-memory token slot.
#[derive(Clone)]
pub struct MemoryBackend {
    app_key: String,
    slot: Arc<RwLock<Option<Token>>>,
}

/// Registry constructor for `memory://` URIs.
pub fn factory(_uri: &BackendUri, app_key: &str) -> Result<Box<dyn Backend>> {
    Ok(Box::new(MemoryBackend::new(app_key)))
}

impl MemoryBackend {
    /// Creates an empty slot for `app_key`.
    pub fn new(app_key: &str) -> Self {
        Self {
            app_key: app_key.to_string(),
            slot: Arc::default(),
        }
    }

    /// Creates a slot already holding `token`.
    pub fn with_token(token: Token) -> Self {
        Self {
            app_key: token.app_key.clone(),
            slot: Arc::new(RwLock::new(Some(token))),
        }
    }

    fn poisoned() -> CobeeError {
        CobeeError::BackendPersistence("memory slot lock poisoned".to_string())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<Option<Token>> {
        let slot = self.slot.read().map_err(|_| Self::poisoned())?;
        Ok(slot.clone())
    }

    async fn save(&self, token: &Token) -> Result<()> {
        check_owner(&self.app_key, token)?;
        let mut slot = self.slot.write().map_err(|_| Self::poisoned())?;
        *slot = Some(token.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let mut slot = self.slot.write().map_err(|_| Self::poisoned())?;
        *slot = None;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory (app '{}')", self.app_key)
    }
}
