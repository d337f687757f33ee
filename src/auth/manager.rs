//! Token lifecycle manager
//!
//! [`TokenManager`] is the exclusive owner of the current [`Token`] and of
//! the [`Backend`] it is persisted in.  Construction loads the stored token
//! or runs the PIN [`AuthorizationFlow`] when there is none.  Afterwards
//! every authenticated call goes through [`TokenManager::request`], which
//! runs [`TokenManager::check_and_refresh`] first, so no call is dispatched
//! with an expired credential.
//!
//! All mutating methods take `&mut self`: a refresh always completes, with
//! success or failure, before the dependent request is built.
//!
//! # Examples
//!
//! ```no_run
//! use cobee::auth::manager::TokenManager;
//! use cobee::config::Config;
//!
//! # async fn example() -> cobee::error::Result<()> {
//! let mut config = Config::new("my-app-key");
//! config.storage.backend = "sqlite://.ecobee.db".to_string();
//!
//! let mut manager = TokenManager::new(config).await?;
//! let thermostats = manager
//!     .get_json("1/thermostat", &[("json".to_string(), "{}".to_string())])
//!     .await?;
//! println!("{thermostats}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::auth::client::{OAuthClient, TokenPoll, TokenRequest};
use crate::auth::flow::{stderr_prompt, AuthorizationFlow, PinPrompt};
use crate::auth::token::{self, Token};
use crate::backends::{Backend, BackendRegistry};
use crate::config::Config;
use crate::error::{CobeeError, Result};

// ---------------------------------------------------------------------------
// TokenManagerBuilder
// ---------------------------------------------------------------------------

/// Builder for [`TokenManager`] when the defaults need replacing.
///
/// # Examples
///
/// ```no_run
/// use cobee::auth::manager::TokenManager;
/// use cobee::backends::MemoryBackend;
/// use cobee::config::Config;
///
/// # async fn example() -> cobee::error::Result<()> {
/// let manager = TokenManager::builder(Config::new("app"))
///     .backend(Box::new(MemoryBackend::new("app")))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TokenManagerBuilder {
    config: Config,
    registry: Option<BackendRegistry>,
    backend: Option<Box<dyn Backend>>,
    prompt: Option<PinPrompt>,
    http: Option<Arc<reqwest::Client>>,
}

impl TokenManagerBuilder {
    /// Resolve the backend URI against `registry` instead of the defaults.
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `backend` directly, skipping URI resolution.
    pub fn backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Show the PIN through `prompt` instead of stderr.
    pub fn prompt(mut self, prompt: PinPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Share an existing HTTP client.
    pub fn http(mut self, http: Arc<reqwest::Client>) -> Self {
        self.http = Some(http);
        self
    }

    /// Resolves the backend, prepares its schema and loads the stored token,
    /// authorizing from scratch when there is none.
    ///
    /// # Errors
    ///
    /// - [`CobeeError::UnknownBackend`] / [`CobeeError::InvalidBackendUri`]
    ///   before any network call.
    /// - [`CobeeError::BackendPersistence`] from the store.
    /// - Any error of [`AuthorizationFlow::run`].
    pub async fn build(self) -> Result<TokenManager> {
        let config = self.config;

        let backend = match self.backend {
            Some(backend) => backend,
            None => self
                .registry
                .unwrap_or_else(BackendRegistry::with_defaults)
                .resolve(&config.storage.backend, &config.app_key)?,
        };

        let http = match self.http {
            Some(http) => http,
            None => Arc::new(
                reqwest::Client::builder()
                    .timeout(config.request_timeout())
                    .build()
                    .map_err(CobeeError::Http)?,
            ),
        };

        let client = OAuthClient::new(http, &config.api.base_url, &config.app_key)?;
        let prompt = self.prompt.unwrap_or_else(stderr_prompt);

        backend.ensure_schema().await?;

        let token = match backend.load().await? {
            Some(token) => {
                tracing::info!(backend = %backend.describe(), "Loaded stored token");
                token
            }
            None => {
                tracing::info!(
                    backend = %backend.describe(),
                    "No stored token; starting PIN authorization"
                );
                let token = AuthorizationFlow::new(client.clone(), config.flow_settings())
                    .with_prompt(Arc::clone(&prompt))
                    .run()
                    .await?;
                backend.save(&token).await?;
                tracing::info!("Persisted new token");
                token
            }
        };

        Ok(TokenManager {
            leeway: config.auth.refresh_leeway_seconds,
            config,
            client,
            backend,
            token,
            prompt,
        })
    }
}

// ---------------------------------------------------------------------------
// TokenManager
// ---------------------------------------------------------------------------

/// Owner of the current token and gatekeeper for authenticated calls.
pub struct TokenManager {
    config: Config,
    client: OAuthClient,
    backend: Box<dyn Backend>,
    token: Token,
    prompt: PinPrompt,
    leeway: i64,
}

impl TokenManager {
    /// Builds a manager with the default backend registry.
    ///
    /// # Errors
    ///
    /// See [`TokenManagerBuilder::build`].
    pub async fn new(config: Config) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Builds a manager resolving the backend URI against `registry`.
    ///
    /// # Errors
    ///
    /// See [`TokenManagerBuilder::build`].
    pub async fn with_registry(config: Config, registry: &BackendRegistry) -> Result<Self> {
        Self::builder(config).registry(registry.clone()).build().await
    }

    /// Starts a [`TokenManagerBuilder`].
    pub fn builder(config: Config) -> TokenManagerBuilder {
        TokenManagerBuilder {
            config,
            registry: None,
            backend: None,
            prompt: None,
            http: None,
        }
    }

    /// Current token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Where the token is persisted.
    pub fn backend_description(&self) -> String {
        self.backend.describe()
    }

    /// Refreshes the token when it is expired.
    ///
    /// Returns `true` when a refresh happened.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::TokenRefresh`] when the refresh call fails or
    /// yields no usable credential, and [`CobeeError::BackendPersistence`]
    /// when the new token cannot be saved.  In both cases the current token
    /// is left in place but must not be used for the pending call.
    pub async fn check_and_refresh(&mut self) -> Result<bool> {
        if !self.token.is_expired_at(token::now(), self.leeway) {
            return Ok(false);
        }

        tracing::info!(expires_at = self.token.expires_at, "Access token expired; refreshing");
        self.refresh().await?;
        Ok(true)
    }

    /// Refreshes the token regardless of its expiry.
    ///
    /// # Errors
    ///
    /// Same as [`check_and_refresh`](Self::check_and_refresh).
    pub async fn force_refresh(&mut self) -> Result<()> {
        self.refresh().await
    }

    /// Runs a new PIN authorization and replaces the stored token.
    ///
    /// Never called automatically: entering a PIN is an operator action.
    ///
    /// # Errors
    ///
    /// Any error of [`AuthorizationFlow::run`] or of the backend.
    pub async fn reauthorize(&mut self) -> Result<()> {
        let token = AuthorizationFlow::new(self.client.clone(), self.config.flow_settings())
            .with_prompt(Arc::clone(&self.prompt))
            .run()
            .await?;
        self.backend.save(&token).await?;
        tracing::info!("Persisted re-authorized token");
        self.token = token;
        Ok(())
    }

    /// Deletes the stored token and drops the manager.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::BackendPersistence`] if the delete fails.
    pub async fn logout(self) -> Result<()> {
        self.backend.delete().await?;
        tracing::info!(backend = %self.backend.describe(), "Deleted stored token");
        Ok(())
    }

    /// Returns a valid access token, refreshing first when needed.
    ///
    /// # Errors
    ///
    /// Same as [`check_and_refresh`](Self::check_and_refresh).
    pub async fn access_token(&mut self) -> Result<&str> {
        self.check_and_refresh().await?;
        Ok(&self.token.access_token)
    }

    /// Builds an authenticated request to `<base_url>/<path>`.
    ///
    /// The token is checked, and refreshed when expired, before the builder
    /// is returned; a failed refresh returns an error and no request.
    ///
    /// # Errors
    ///
    /// Same as [`check_and_refresh`](Self::check_and_refresh), plus
    /// [`CobeeError::Config`] for an invalid path.
    pub async fn request(
        &mut self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder> {
        self.check_and_refresh().await?;
        let url = self.client.endpoint(path)?;
        Ok(self
            .client
            .http()
            .request(method, url)
            .header("Accept", "application/json")
            .bearer_auth(&self.token.access_token))
    }

    /// Authenticated `GET` returning the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::Api`] for a non-success status, besides the
    /// errors of [`request`](Self::request).
    pub async fn get_json(
        &mut self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value> {
        let request = self.request(reqwest::Method::GET, path).await?.query(query);
        send_json(request).await
    }

    /// Authenticated `POST` of a JSON body returning the decoded JSON answer.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_json(
        &mut self,
        path: &str,
        query: &[(String, String)],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = self
            .request(reqwest::Method::POST, path)
            .await?
            .query(query)
            .json(body);
        send_json(request).await
    }

    async fn refresh(&mut self) -> Result<()> {
        if self.token.refresh_token.is_empty() {
            return Err(CobeeError::TokenRefresh("no refresh token stored".to_string()).into());
        }

        let answer = self
            .client
            .request_token(TokenRequest::Refresh {
                refresh_token: &self.token.refresh_token,
            })
            .await
            .map_err(|e| CobeeError::TokenRefresh(format!("request failed: {e}")))?;

        let grant = match answer {
            TokenPoll::Granted(grant) => grant,
            TokenPoll::Pending | TokenPoll::SlowDown => {
                tracing::warn!("Token endpoint answered a refresh with a pending status");
                return Err(CobeeError::TokenRefresh(
                    "token endpoint answered with a pending status".to_string(),
                )
                .into());
            }
            TokenPoll::Rejected { error, description } => {
                tracing::warn!("Token refresh rejected: {error}");
                let message = match description {
                    Some(d) => format!("{error}: {d}"),
                    None => error,
                };
                return Err(CobeeError::TokenRefresh(message).into());
            }
        };

        let issued = token::now();
        let next = self
            .token
            .refreshed(&grant, issued)
            .map_err(|e| CobeeError::TokenRefresh(e.to_string()))?;

        if next.is_expired_at(issued, self.leeway) {
            tracing::warn!(expires_in = next.expires_in(), "Refresh returned an already expired token");
            return Err(CobeeError::TokenRefresh(format!(
                "refreshed token is already expired (expires_in {}s)",
                next.expires_in()
            ))
            .into());
        }

        self.backend.save(&next).await?;
        tracing::info!(expires_at = next.expires_at, "Persisted refreshed token");
        self.token = next;
        Ok(())
    }
}

async fn send_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
    let resp = request.send().await.map_err(CobeeError::Http)?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        return Err(CobeeError::Api {
            status: status.as_u16(),
            message: body,
        }
        .into());
    }
    let value = resp.json().await.map_err(CobeeError::Http)?;
    Ok(value)
}
