//! Cobee - ecobee API token manager
//!
#![doc = "Cobee - ecobee API token manager"]
#![doc = "Main entry point for the cobee command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cobee::cli::{Cli, Commands};
use cobee::commands;
use cobee::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/cobee.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration; listing backends needs neither an app key
    // nor a valid store
    if !matches!(cli.command, Commands::Backends) {
        config.validate()?;
    }

    // Execute command
    match cli.command {
        Commands::Authorize { force } => {
            tracing::info!("Starting authorization");
            if force {
                tracing::debug!("Forcing a new PIN authorization");
            }
            commands::auth::authorize(config, force).await?;
        }
        Commands::Status { json } => {
            commands::status::show_status(&config, json).await?;
        }
        Commands::Refresh => {
            tracing::info!("Refreshing token");
            commands::auth::refresh(config).await?;
        }
        Commands::Request { path, query } => {
            tracing::debug!("Requesting {} with {} query parameters", path, query.len());
            commands::request::get(config, &path, &query).await?;
        }
        Commands::Logout => {
            commands::auth::logout(config).await?;
        }
        Commands::Backends => {
            commands::backends::list_backends(&config);
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "cobee=debug" } else { "cobee=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
