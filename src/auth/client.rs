//! ecobee authorization and token endpoint client
//!
//! Thin wrapper over `GET <base>/authorize` and `POST <base>/token`.  It does
//! no retrying and holds no token state; it only sends the request and
//! classifies the answer so that [`AuthorizationFlow`](super::flow::AuthorizationFlow)
//! and [`TokenManager`](super::manager::TokenManager) can decide what to do.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::auth::token::TokenGrant;
use crate::error::{CobeeError, Result};

/// Production ecobee API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.ecobee.com";

/// `response_type` requesting a PIN from the authorization endpoint.
const PIN_RESPONSE_TYPE: &str = "ecobeePin";

/// `grant_type` redeeming the authorization code after PIN entry.
const PIN_GRANT_TYPE: &str = "ecobeePin";

/// `grant_type` minting a new access token from a refresh token.
const REFRESH_GRANT_TYPE: &str = "refresh_token";

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// PIN and redeemable code returned by the authorization endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct PinGrant {
    /// PIN the operator enters in the ecobee portal.
    pub pin: String,
    /// Code redeemed at the token endpoint once the PIN is accepted.
    pub code: String,
    /// Granted scope, when echoed by the provider.
    pub scope: Option<String>,
    /// Minutes until the PIN expires.
    pub expires_in_minutes: Option<u64>,
    /// Provider-suggested polling interval in seconds.
    pub interval: Option<u64>,
}

impl std::fmt::Debug for PinGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinGrant")
            .field("pin", &"<redacted>")
            .field("code", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_in_minutes", &self.expires_in_minutes)
            .field("interval", &self.interval)
            .finish()
    }
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    #[serde(rename = "ecobeePin")]
    ecobee_pin: String,
    code: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    interval: Option<u64>,
}

/// Classified answer of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPoll {
    /// A credential was issued.
    Granted(TokenGrant),
    /// The operator has not entered the PIN yet.
    Pending,
    /// Pending, and the client is polling too fast.
    SlowDown,
    /// Any other error; polling must stop.
    Rejected {
        /// OAuth `error` code, or a synthetic one for malformed responses.
        error: String,
        /// Optional `error_description`.
        description: Option<String>,
    },
}

impl TokenPoll {
    /// Classifies a token endpoint response body.
    ///
    /// The body decides, not the status: ecobee answers pending polls with a
    /// non-2xx status and an `error` field.
    pub fn classify(status: reqwest::StatusCode, body: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => {
                return Self::Rejected {
                    error: if status.is_success() {
                        "invalid_response".to_string()
                    } else {
                        format!("http_{}", status.as_u16())
                    },
                    description: Some(body.chars().take(200).collect()),
                }
            }
        };

        if value.get("access_token").is_some() {
            return match serde_json::from_value::<TokenGrant>(value) {
                Ok(grant) => Self::Granted(grant),
                Err(e) => Self::Rejected {
                    error: "invalid_response".to_string(),
                    description: Some(e.to_string()),
                },
            };
        }

        let description = value
            .get("error_description")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match value.get("error").and_then(|v| v.as_str()) {
            Some("authorization_pending") => Self::Pending,
            Some("slow_down") => Self::SlowDown,
            Some(other) => Self::Rejected {
                error: other.to_string(),
                description,
            },
            None => Self::Rejected {
                error: if status.is_success() {
                    "invalid_response".to_string()
                } else {
                    format!("http_{}", status.as_u16())
                },
                description,
            },
        }
    }
}

/// Which grant to request from the token endpoint.
#[derive(Clone, Copy)]
pub enum TokenRequest<'a> {
    /// Redeem the authorization code from the PIN step.
    Pin {
        /// Code returned alongside the PIN.
        code: &'a str,
    },
    /// Exchange a refresh token.
    Refresh {
        /// Refresh token of the current credential.
        refresh_token: &'a str,
    },
}

// ---------------------------------------------------------------------------
// OAuthClient
// ---------------------------------------------------------------------------

/// Client for the ecobee authorization and token endpoints.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cobee::auth::client::OAuthClient;
///
/// let client = OAuthClient::new(
///     Arc::new(reqwest::Client::new()),
///     "https://api.ecobee.com",
///     "my-app-key",
/// )
/// .unwrap();
/// assert_eq!(client.base_url().as_str(), "https://api.ecobee.com/");
/// ```
#[derive(Clone)]
pub struct OAuthClient {
    http: Arc<reqwest::Client>,
    base_url: Url,
    app_key: String,
}

impl OAuthClient {
    /// Creates a client for `base_url`, authenticating as `app_key`.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::Config`] if `base_url` is not a valid URL.
    pub fn new(http: Arc<reqwest::Client>, base_url: &str, app_key: &str) -> Result<Self> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            app_key: app_key.to_string(),
        })
    }

    /// Base URL with a trailing slash.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Application key sent as `client_id`.
    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Shared HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Resolves `path` against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::Config`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| CobeeError::Config(format!("invalid endpoint path '{path}': {e}")).into())
    }

    /// Requests a PIN and authorization code.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::AuthorizationRequest`] on transport failure,
    /// any non-success status, or a body without `ecobeePin`/`code`.
    pub async fn authorize(&self, scope: &str) -> Result<PinGrant> {
        let url = self.endpoint("authorize")?;

        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .query(&[
                ("response_type", PIN_RESPONSE_TYPE),
                ("client_id", self.app_key.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| CobeeError::AuthorizationRequest(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            return Err(CobeeError::AuthorizationRequest(format!(
                "authorization endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: AuthorizeResponse = resp.json().await.map_err(|e| {
            CobeeError::AuthorizationRequest(format!("failed to parse authorization response: {e}"))
        })?;

        Ok(PinGrant {
            pin: raw.ecobee_pin,
            code: raw.code,
            scope: raw.scope,
            expires_in_minutes: raw.expires_in,
            interval: raw.interval,
        })
    }

    /// Sends one token endpoint request and classifies the answer.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::Http`] only for transport failures; every HTTP
    /// answer is mapped to a [`TokenPoll`].
    pub async fn request_token(&self, request: TokenRequest<'_>) -> Result<TokenPoll> {
        let url = self.endpoint("token")?;

        let mut params: Vec<(&str, &str)> = vec![("client_id", self.app_key.as_str())];
        match request {
            TokenRequest::Pin { code } => {
                params.push(("grant_type", PIN_GRANT_TYPE));
                params.push(("code", code));
            }
            TokenRequest::Refresh { refresh_token } => {
                params.push(("grant_type", REFRESH_GRANT_TYPE));
                params.push(("refresh_token", refresh_token));
            }
        }
        params.push(("ecobee_type", "jwt"));

        let resp = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await
            .map_err(CobeeError::Http)?;

        let status = resp.status();
        let body = resp.text().await.map_err(CobeeError::Http)?;
        Ok(TokenPoll::classify(status, &body))
    }
}

/// Parses `base_url` and makes sure its path ends with `/` so relative
/// endpoint names are appended rather than substituted.
fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| CobeeError::Config(format!("invalid API base URL '{base_url}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
