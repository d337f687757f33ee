/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `auth`: authorize, refresh and logout
- `status`: inspect the stored token without touching the network
- `request`: authenticated GET against the API
- `backends`: list registered storage schemes

Handlers that only read or delete the stored token resolve the backend
directly. Handlers that need a valid token go through `TokenManager`, which
authorizes on first use.
*/

use crate::auth::manager::TokenManager;
use crate::backends::{Backend, BackendRegistry};
use crate::config::Config;
use crate::error::{CobeeError, Result};

fn resolve_backend(config: &Config) -> Result<Box<dyn Backend>> {
    let backend =
        BackendRegistry::with_defaults().resolve(&config.storage.backend, &config.app_key)?;
    Ok(backend)
}

// Authorization lifecycle commands
pub mod auth {
    use super::*;
    use colored::Colorize;

    /// Ensure a token exists, running the PIN flow when needed
    ///
    /// With `force`, a stored token is replaced by a fresh PIN authorization.
    /// The old token stays in the store until the new one is saved.
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `force` - Authorize again even when a token is stored
    pub async fn authorize(config: Config, force: bool) -> Result<()> {
        let backend = resolve_backend(&config)?;
        backend.ensure_schema().await?;
        let had_token = backend.load().await?.is_some();

        let mut manager = TokenManager::builder(config).backend(backend).build().await?;
        if force && had_token {
            tracing::info!("Replacing stored token with a new authorization");
            manager.reauthorize().await?;
        }

        let token = manager.token();
        println!(
            "{} token for app '{}' stored in {} (expires {})",
            "Authorized:".green().bold(),
            token.app_key,
            manager.backend_description(),
            super::status::format_timestamp(token.expires_at)
        );
        Ok(())
    }

    /// Refresh the stored token immediately
    pub async fn refresh(config: Config) -> Result<()> {
        let mut manager = TokenManager::new(config).await?;
        manager.force_refresh().await?;
        println!(
            "{} new token expires {}",
            "Refreshed:".green().bold(),
            super::status::format_timestamp(manager.token().expires_at)
        );
        Ok(())
    }

    /// Delete the stored token without contacting the API
    pub async fn logout(config: Config) -> Result<()> {
        let backend = resolve_backend(&config)?;
        backend.ensure_schema().await?;
        backend.delete().await?;
        tracing::info!(backend = %backend.describe(), "Deleted stored token");
        println!("{} {}", "Logged out:".yellow().bold(), backend.describe());
        Ok(())
    }
}

// Token inspection
pub mod status {
    use super::*;
    use crate::auth::token::{self, Token};
    use chrono::{TimeZone, Utc};
    use colored::Colorize;
    use prettytable::{row, Table};
    use serde::Serialize;

    /// Secret-free view of the stored token
    #[derive(Debug, Clone, Serialize, PartialEq, Eq)]
    pub struct TokenStatus {
        /// Application key the status belongs to
        pub app_key: String,
        /// Backend description
        pub backend: String,
        /// Whether a token is stored at all
        pub authorized: bool,
        /// Token type, e.g. `Bearer`
        pub token_type: Option<String>,
        /// Granted scope
        pub scope: Option<String>,
        /// Issue time (unix seconds)
        pub issued: Option<i64>,
        /// Expiry time (unix seconds)
        pub expires_at: Option<i64>,
        /// Validity the token was issued with (seconds)
        pub expires_in: Option<i64>,
        /// Seconds left before expiry, negative once expired
        pub remaining_seconds: Option<i64>,
        /// Whether the access token is expired now
        pub expired: Option<bool>,
    }

    impl TokenStatus {
        /// Build the status of `token` as seen at `now`
        pub fn from_token(token: Option<&Token>, app_key: &str, backend: String, now: i64) -> Self {
            match token {
                Some(t) => Self {
                    app_key: t.app_key.clone(),
                    backend,
                    authorized: true,
                    token_type: Some(t.token_type.clone()),
                    scope: Some(t.scope.clone()),
                    issued: Some(t.issued),
                    expires_at: Some(t.expires_at),
                    expires_in: Some(t.expires_in()),
                    remaining_seconds: Some(t.expires_at - now),
                    expired: Some(t.is_expired_at(now, 0)),
                },
                None => Self {
                    app_key: app_key.to_string(),
                    backend,
                    authorized: false,
                    token_type: None,
                    scope: None,
                    issued: None,
                    expires_at: None,
                    expires_in: None,
                    remaining_seconds: None,
                    expired: None,
                },
            }
        }
    }

    /// Show the stored token
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `json` - Print JSON instead of a table
    pub async fn show_status(config: &Config, json: bool) -> Result<()> {
        let backend = resolve_backend(config)?;
        backend.ensure_schema().await?;
        let stored = backend.load().await?;
        let status =
            TokenStatus::from_token(stored.as_ref(), &config.app_key, backend.describe(), token::now());

        if json {
            let out = serde_json::to_string_pretty(&status).map_err(CobeeError::Serialization)?;
            println!("{}", out);
        } else {
            println!();
            status_table(&status).printstd();
            println!();
        }
        Ok(())
    }

    /// Render a status as a two-column table
    pub fn status_table(status: &TokenStatus) -> Table {
        let mut table = Table::new();
        table.add_row(row!["App Key", status.app_key]);
        table.add_row(row!["Backend", status.backend]);

        if !status.authorized {
            table.add_row(row!["State", "not authorized".red().to_string()]);
            return table;
        }

        let state = match status.expired {
            Some(true) => "expired".yellow().to_string(),
            _ => "valid".green().to_string(),
        };
        table.add_row(row!["State", state]);
        table.add_row(row![
            "Token Type",
            status.token_type.as_deref().unwrap_or("unknown")
        ]);
        table.add_row(row!["Scope", status.scope.as_deref().unwrap_or("")]);
        if let Some(issued) = status.issued {
            table.add_row(row!["Issued", format_timestamp(issued)]);
        }
        if let Some(expires_at) = status.expires_at {
            table.add_row(row!["Expires", format_timestamp(expires_at)]);
        }
        if let Some(remaining) = status.remaining_seconds {
            table.add_row(row!["Remaining", format!("{}s", remaining)]);
        }
        table
    }

    /// Format unix seconds as RFC 3339, or the raw number if out of range
    pub fn format_timestamp(secs: i64) -> String {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| secs.to_string())
    }

}

// Authenticated API calls
pub mod request {
    use super::*;

    /// GET `path` with `query` and print the JSON answer
    pub async fn get(config: Config, path: &str, query: &[(String, String)]) -> Result<()> {
        let mut manager = TokenManager::new(config).await?;
        let body = manager.get_json(path, query).await?;
        let out = serde_json::to_string_pretty(&body).map_err(CobeeError::Serialization)?;
        println!("{}", out);
        Ok(())
    }
}

// Backend listing
pub mod backends {
    use super::*;

    /// Print the registered schemes, marking the configured one
    pub fn list_backends(config: &Config) {
        let registry = BackendRegistry::with_defaults();
        let configured = crate::backends::BackendUri::parse(&config.storage.backend)
            .map(|u| u.scheme)
            .ok();

        for scheme in registry.schemes() {
            if configured.as_deref() == Some(scheme) {
                println!("{}:// (configured)", scheme);
            } else {
                println!("{}://", scheme);
            }
        }
    }
}
