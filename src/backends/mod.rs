//! Pluggable token storage
//!
//! A [`Backend`] persists exactly one [`Token`] per application key.  The
//! concrete implementation is chosen from the scheme of a connection URI
//! (`sqlite://…`, `redis://…`) through an explicit [`BackendRegistry`], so
//! the authorization and refresh logic never knows which store is active.
//!
//! # Module Layout
//!
//! - [`sqlite`]        -- single-table SQLite file (the default)
//! - [`sled_store`]    -- embedded `sled` key-value tree
//! - [`redis_store`]   -- Redis key holding the JSON-encoded token
//! - [`keyring_store`] -- OS credential store
//! - [`memory`]        -- process-local map, used for tests and dry runs

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::auth::token::Token;
use crate::error::{CobeeError, Result};

pub mod keyring_store;
pub mod memory;
pub mod redis_store;
pub mod sled_store;
pub mod sqlite;

pub use keyring_store::KeyringBackend;
pub use memory::MemoryBackend;
pub use redis_store::RedisBackend;
pub use sled_store::SledBackend;
pub use sqlite::SqliteBackend;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Storage contract shared by every backend.
///
/// Implementations own only the storage medium; they hold no flow state.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Creates the persistent structure if absent.  Safe to call on every
    /// startup.
    async fn ensure_schema(&self) -> Result<()>;

    /// Returns the stored token, or `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<Token>>;

    /// Replaces the stored token.  Either the new value is fully visible to
    /// a later [`load`](Self::load) or the previous value is kept.
    async fn save(&self, token: &Token) -> Result<()>;

    /// Removes the stored token.  Deleting a missing token is not an error.
    async fn delete(&self) -> Result<()>;

    /// Human-readable description of where the token lives.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// BackendUri
// ---------------------------------------------------------------------------

/// A backend connection URI split into scheme and location.
///
/// # Examples
///
/// ```
/// use cobee::backends::BackendUri;
///
/// let uri = BackendUri::parse("SQLite://.ecobee.db").unwrap();
/// assert_eq!(uri.scheme, "sqlite");
/// assert_eq!(uri.location, ".ecobee.db");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUri {
    /// Lower-cased scheme (substring before `://`).
    pub scheme: String,
    /// Everything after `://`.
    pub location: String,
    /// The URI as given.
    pub raw: String,
}

impl BackendUri {
    /// Parses `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::InvalidBackendUri`] when `uri` has no `://`
    /// separator or an empty scheme.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, location) = uri
            .split_once("://")
            .ok_or_else(|| CobeeError::InvalidBackendUri(uri.to_string()))?;

        if scheme.trim().is_empty() {
            return Err(CobeeError::InvalidBackendUri(uri.to_string()).into());
        }

        Ok(Self {
            scheme: scheme.trim().to_ascii_lowercase(),
            location: location.to_string(),
            raw: uri.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// BackendRegistry
// ---------------------------------------------------------------------------

/// Constructor registered for one scheme.
///
/// Receives the parsed URI and the application key the backend stores a
/// token for.
pub type BackendFactory = fn(&BackendUri, &str) -> Result<Box<dyn Backend>>;

/// Explicit table mapping URI schemes to backend constructors.
///
/// # Examples
///
/// ```
/// use cobee::backends::BackendRegistry;
///
/// let registry = BackendRegistry::with_defaults();
/// assert!(registry.schemes().contains(&"sqlite"));
/// assert!(registry.resolve("foo://bar", "app").is_err());
/// ```
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in backend registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("sqlite", sqlite::factory);
        registry.register("sled", sled_store::factory);
        registry.register("redis", redis_store::factory);
        registry.register("keyring", keyring_store::factory);
        registry.register("memory", memory::factory);
        registry
    }

    /// Registers `factory` for `scheme`, replacing any previous entry.
    pub fn register(&mut self, scheme: &str, factory: BackendFactory) {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
    }

    /// Registered schemes in sorted order.
    pub fn schemes(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Constructs the backend named by `uri` for `app_key`.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::InvalidBackendUri`] for a malformed URI and
    /// [`CobeeError::UnknownBackend`] when no factory is registered for the
    /// scheme.  Factory errors are propagated unchanged.
    pub fn resolve(&self, uri: &str, app_key: &str) -> Result<Box<dyn Backend>> {
        let parsed = BackendUri::parse(uri)?;
        let factory = self
            .factories
            .get(&parsed.scheme)
            .ok_or_else(|| CobeeError::UnknownBackend(parsed.scheme.clone()))?;

        tracing::debug!(scheme = %parsed.scheme, "Resolved token backend");
        factory(&parsed, app_key)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Rejects a token minted for a different application than `app_key`.
///
/// Every backend stores one token per application key, so saving another
/// application's token would relabel it.
pub(crate) fn check_owner(app_key: &str, token: &Token) -> Result<()> {
    if token.app_key != app_key {
        return Err(CobeeError::BackendPersistence(format!(
            "token belongs to app '{}' but this store holds app '{}'",
            token.app_key, app_key
        ))
        .into());
    }
    Ok(())
}

/// Maps any storage-layer error into [`CobeeError::BackendPersistence`].
pub(crate) fn persistence<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> CobeeError + '_ {
    move |e| CobeeError::BackendPersistence(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_owner() {
        let token = crate::test_utils::sample_token("app-a", "t1", 0, 60);
        assert!(check_owner("app-a", &token).is_ok());
        let err = check_owner("app-b", &token).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CobeeError>(),
            Some(CobeeError::BackendPersistence(_))
        ));
    }

    #[test]
    fn test_parse_lowercases_scheme() {
        let uri = BackendUri::parse("REDIS://localhost:6379/0").expect("parse");
        assert_eq!(uri.scheme, "redis");
        assert_eq!(uri.location, "localhost:6379/0");
        assert_eq!(uri.raw, "REDIS://localhost:6379/0");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        let err = BackendUri::parse("just-a-path.db").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CobeeError>(),
            Some(CobeeError::InvalidBackendUri(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_scheme() {
        assert!(BackendUri::parse("://nothing").is_err());
    }

    #[test]
    fn test_resolve_unknown_scheme() {
        let registry = BackendRegistry::with_defaults();
        let err = registry.resolve("foo://bar", "app").err().expect("error");
        match err.downcast_ref::<CobeeError>() {
            Some(CobeeError::UnknownBackend(scheme)) => assert_eq!(scheme, "foo"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = BackendRegistry::with_defaults();
        let backend = registry.resolve("MeMoRy://", "app").expect("resolve");
        assert!(backend.describe().starts_with("memory"));
    }

    #[test]
    fn test_empty_registry_knows_nothing() {
        let registry = BackendRegistry::new();
        assert!(registry.schemes().is_empty());
        assert!(registry.resolve("sqlite://x.db", "app").is_err());
    }

    #[test]
    fn test_register_custom_factory() {
        fn custom(_uri: &BackendUri, app_key: &str) -> Result<Box<dyn Backend>> {
            Ok(Box::new(MemoryBackend::new(app_key)))
        }

        let mut registry = BackendRegistry::new();
        registry.register("Custom", custom);
        assert_eq!(registry.schemes(), vec!["custom"]);
        assert!(registry.resolve("custom://anything", "app").is_ok());
    }

    #[test]
    fn test_default_schemes_are_enumerable() {
        let registry = BackendRegistry::with_defaults();
        assert_eq!(
            registry.schemes(),
            vec!["keyring", "memory", "redis", "sled", "sqlite"]
        );
    }
}
