//! Cobee - ecobee API token manager library
//!
//! This library authorizes an application against the ecobee API with the
//! PIN flow, persists the resulting token in a pluggable backend, and
//! refreshes it before any authenticated call is made.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Token type, OAuth client, PIN flow, and the token manager
//! - `backends`: Storage trait, URI registry, and built-in stores
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers behind the CLI subcommands
//!
//! # Example
//!
//! ```no_run
//! use cobee::{Config, TokenManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::new("my-app-key");
//!     config.storage.backend = "sqlite://.ecobee.db".to_string();
//!     config.validate()?;
//!
//!     let mut manager = TokenManager::new(config).await?;
//!     let request = manager.request(reqwest::Method::GET, "1/thermostat").await?;
//!     let _response = request.send().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backends;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::{Token, TokenManager};
pub use backends::{Backend, BackendRegistry};
pub use config::Config;
pub use error::{CobeeError, Result};

#[cfg(test)]
pub mod test_utils;
