//! Token persistence via the OS keyring
//!
//! Uses the operating system's native credential store (Keychain on macOS,
//! Secret Service on Linux, Windows Credential Manager on Windows).  The
//! token is serialized to JSON and stored as the secret of the entry
//! `(<service>, <app_key>)`; the service comes from the URI location
//! (`keyring://cobee`) and defaults to `cobee`.

use async_trait::async_trait;

use super::{check_owner, persistence, Backend, BackendUri};
use crate::auth::token::Token;
use crate::error::Result;

/// Keyring service used when the URI names none.
pub const DEFAULT_SERVICE: &str = "cobee";

/// Stateless accessor for one keyring entry.
pub struct KeyringBackend {
    service: String,
    app_key: String,
}

/// Registry constructor for `keyring://` URIs.
pub fn factory(uri: &BackendUri, app_key: &str) -> Result<Box<dyn Backend>> {
    let service = uri.location.trim_matches('/');
    let service = if service.is_empty() {
        DEFAULT_SERVICE
    } else {
        service
    };
    Ok(Box::new(KeyringBackend::new(service, app_key)))
}

impl KeyringBackend {
    /// Creates an accessor for the entry `(service, app_key)`.
    pub fn new(service: &str, app_key: &str) -> Self {
        Self {
            service: service.to_string(),
            app_key: app_key.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        let entry = keyring::Entry::new(&self.service, &self.app_key)
            .map_err(persistence("Keyring entry unavailable"))?;
        Ok(entry)
    }
}

#[async_trait]
impl Backend for KeyringBackend {
    async fn ensure_schema(&self) -> Result<()> {
        // Building the entry validates the service/user pair.
        self.entry()?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Token>> {
        match self.entry()?.get_password() {
            Ok(json_str) => {
                let token = serde_json::from_str(&json_str)
                    .map_err(persistence("Stored keyring token is malformed"))?;
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(persistence("Keyring read failed")(e).into()),
        }
    }

    async fn save(&self, token: &Token) -> Result<()> {
        check_owner(&self.app_key, token)?;
        let json_str = serde_json::to_string(token).map_err(persistence("Serialization failed"))?;
        self.entry()?
            .set_password(&json_str)
            .map_err(persistence("Keyring write failed"))?;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(persistence("Keyring delete failed")(e).into()),
        }
    }

    fn describe(&self) -> String {
        format!("keyring (service '{}')", self.service)
    }
}
