//! Command-line interface definition for Cobee
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for authorization, token inspection, and
//! authenticated API requests.

use clap::{Parser, Subcommand};

/// Cobee - ecobee API token manager
///
/// Authorizes an application with the ecobee PIN flow, keeps its token
/// fresh in a pluggable store, and issues authenticated API calls.
#[derive(Parser, Debug, Clone)]
#[command(name = "cobee")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/cobee.yaml")]
    pub config: Option<String>,

    /// Application key (overrides config and COBEE_APP_KEY)
    #[arg(long, global = true)]
    pub app_key: Option<String>,

    /// API base URL (overrides config and COBEE_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Token backend URI, e.g. sqlite:///path/to/ecobee.db or memory://
    #[arg(short, long, global = true)]
    pub backend: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Cobee
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the PIN authorization flow if no token is stored
    Authorize {
        /// Discard any stored token and authorize again
        #[arg(short, long)]
        force: bool,
    },

    /// Show the stored token without contacting the API
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh the stored token now
    Refresh,

    /// Perform an authenticated GET and print the JSON answer
    Request {
        /// Path relative to the API base URL, e.g. 1/thermostat
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Delete the stored token
    Logout,

    /// List the registered backend schemes
    Backends,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
