//! Configuration management for Cobee
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use std::path::Path;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::auth::client::DEFAULT_API_URL;
use crate::auth::flow::FlowSettings;
use crate::backends::BackendUri;
use crate::error::{CobeeError, Result};

/// Main configuration structure for Cobee
///
/// Everything a [`TokenManager`](crate::auth::manager::TokenManager) needs:
/// the application key, where the API lives, how to poll during
/// authorization, and where the token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application key issued in the ecobee developer portal
    #[serde(default)]
    pub app_key: String,

    /// API endpoint settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Authorization and refresh behavior
    #[serde(default)]
    pub auth: AuthConfig,

    /// Token storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// API endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for `/authorize`, `/token` and resource calls
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Scope requested during authorization
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_scope() -> String {
    "smartRead,smartWrite".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            scope: default_scope(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Authorization flow and refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Retries after the first token poll
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sleep between pending polls (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Use the polling interval suggested by the provider when it sends one
    #[serde(default = "default_respect_provider_interval")]
    pub respect_provider_interval: bool,

    /// Refresh this many seconds before `expires_at`
    #[serde(default)]
    pub refresh_leeway_seconds: i64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    60
}

fn default_respect_provider_interval() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            poll_interval_seconds: default_poll_interval(),
            respect_provider_interval: default_respect_provider_interval(),
            refresh_leeway_seconds: 0,
        }
    }
}

/// Token storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend connection URI (`sqlite://…`, `sled://…`, `redis://…`,
    /// `keyring://…`, `memory://`)
    #[serde(default = "default_backend_uri")]
    pub backend: String,
}

/// Default backend: `ecobee.db` in the platform data directory, or
/// `.ecobee.db` in the working directory when no home directory is known.
pub fn default_backend_uri() -> String {
    match ProjectDirs::from("com", "ecobee", "cobee") {
        Some(dirs) => format!("sqlite://{}", dirs.data_dir().join("ecobee.db").display()),
        None => "sqlite://.ecobee.db".to_string(),
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_uri(),
        }
    }
}

impl Config {
    /// Creates a default configuration for `app_key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cobee::config::Config;
    ///
    /// let config = Config::new("my-app-key");
    /// assert_eq!(config.api.base_url, "https://api.ecobee.com");
    /// assert_eq!(config.auth.max_retries, 5);
    /// ```
    pub fn new(app_key: &str) -> Self {
        Self {
            app_key: app_key.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CobeeError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| CobeeError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(app_key) = std::env::var("COBEE_APP_KEY") {
            self.app_key = app_key;
        }

        if let Ok(url) = std::env::var("COBEE_API_URL") {
            self.api.base_url = url;
        }

        if let Ok(scope) = std::env::var("COBEE_SCOPE") {
            self.api.scope = scope;
        }

        if let Ok(backend) = std::env::var("COBEE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(retries) = std::env::var("COBEE_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(v) => self.auth.max_retries = v,
                Err(_) => tracing::warn!("Ignoring invalid COBEE_MAX_RETRIES: {}", retries),
            }
        }

        if let Ok(interval) = std::env::var("COBEE_POLL_INTERVAL") {
            match interval.parse::<u64>() {
                Ok(v) => self.auth.poll_interval_seconds = v,
                Err(_) => tracing::warn!("Ignoring invalid COBEE_POLL_INTERVAL: {}", interval),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(app_key) = &cli.app_key {
            self.app_key = app_key.clone();
        }
        if let Some(url) = &cli.api_url {
            self.api.base_url = url.clone();
        }
        if let Some(backend) = &cli.backend {
            self.storage.backend = backend.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Settings for [`AuthorizationFlow`](crate::auth::flow::AuthorizationFlow)
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            scope: self.api.scope.clone(),
            max_retries: self.auth.max_retries,
            poll_interval: Duration::from_secs(self.auth.poll_interval_seconds),
            respect_provider_interval: self.auth.respect_provider_interval,
        }
    }

    /// Per-request HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.app_key.trim().is_empty() {
            return Err(CobeeError::Config(
                "app_key is required (set it in the config file, COBEE_APP_KEY, or --app-key)"
                    .to_string(),
            )
            .into());
        }

        if let Err(e) = url::Url::parse(&self.api.base_url) {
            return Err(CobeeError::Config(format!(
                "Invalid api.base_url '{}': {}",
                self.api.base_url, e
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(CobeeError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.auth.poll_interval_seconds == 0 {
            return Err(CobeeError::Config(
                "auth.poll_interval_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.auth.refresh_leeway_seconds < 0 {
            return Err(CobeeError::Config(
                "auth.refresh_leeway_seconds must not be negative".to_string(),
            )
            .into());
        }

        BackendUri::parse(&self.storage.backend)?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
