//! Immutable token snapshot
//!
//! A [`Token`] is one credential set plus its provenance and expiry.  Values
//! are never patched in place: the first grant comes from
//! [`Token::authorized`] and every refresh produces a successor through
//! [`Token::refreshed`], which the owner swaps in for the old value.
//!
//! `expires_in` is only an input.  Once `expires_at` has been derived the
//! duration is recoverable as `expires_at - issued`, so it is never stored as
//! an independent field.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CobeeError, Result};

/// Current time as epoch seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// TokenGrant
// ---------------------------------------------------------------------------

/// Successful token endpoint response.
///
/// Both the initial PIN grant and the refresh grant return this shape.  Only
/// `access_token` and `expires_in` are needed to mint a [`Token`]; the other
/// fields fall back to the values of the token being superseded.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    /// Bearer credential.
    pub access_token: String,

    /// Credential scheme, usually `"Bearer"`.
    #[serde(default)]
    pub token_type: Option<String>,

    /// Validity in seconds from issuance.
    #[serde(default)]
    pub expires_in: Option<i64>,

    /// Rotated refresh token, when the provider sends one.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

impl TokenGrant {
    fn validated_expires_in(&self) -> Result<i64> {
        if self.access_token.is_empty() {
            return Err(CobeeError::InvalidToken("empty access_token".to_string()).into());
        }
        match self.expires_in {
            Some(secs) if secs >= 0 => Ok(secs),
            Some(secs) => {
                Err(CobeeError::InvalidToken(format!("negative expires_in: {secs}")).into())
            }
            None => Err(CobeeError::InvalidToken("missing expires_in".to_string()).into()),
        }
    }

    /// Expiry instant for a token minted at `issued`.
    fn expires_at_from(&self, issued: i64) -> Result<i64> {
        let expires_in = self.validated_expires_in()?;
        issued.checked_add(expires_in).ok_or_else(|| {
            CobeeError::InvalidToken(format!("expires_in {expires_in} overflows expiry")).into()
        })
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// One persisted credential set.
///
/// Secrets are redacted from the `Debug` representation so a token can be
/// passed to `tracing` without leaking the PIN or bearer credentials.
///
/// # Examples
///
/// ```
/// use cobee::auth::token::{Token, TokenGrant};
///
/// let grant: TokenGrant = serde_json::from_value(serde_json::json!({
///     "access_token": "t1",
///     "token_type": "Bearer",
///     "expires_in": 3600,
///     "refresh_token": "r1",
///     "scope": "smartRead"
/// }))
/// .unwrap();
///
/// let token = Token::authorized("app", "ABC1", "xyz", &grant, 1_700_000_000).unwrap();
/// assert_eq!(token.expires_at, 1_700_003_600);
/// assert_eq!(token.expires_in(), 3600);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Client identifier issued by the API provider.
    pub app_key: String,

    /// PIN shown to the operator during authorization.
    pub pin: String,

    /// Authorization code redeemed for the first token.
    pub initial_code: String,

    /// Current bearer credential.
    pub access_token: String,

    /// Credential scheme.
    pub token_type: String,

    /// Credential used to mint a new access token.
    pub refresh_token: String,

    /// Granted permissions.
    pub scope: String,

    /// When this snapshot was minted (epoch seconds).
    pub issued: i64,

    /// Authoritative expiry instant (epoch seconds).
    pub expires_at: i64,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("app_key", &self.app_key)
            .field("pin", &"<redacted>")
            .field("initial_code", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("refresh_token", &"<redacted>")
            .field("scope", &self.scope)
            .field("issued", &self.issued)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Builds the first token of an application from a PIN grant.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::InvalidToken`] when the grant carries an empty
    /// access token or no usable `expires_in`.
    pub fn authorized(
        app_key: &str,
        pin: &str,
        initial_code: &str,
        grant: &TokenGrant,
        issued: i64,
    ) -> Result<Self> {
        let expires_at = grant.expires_at_from(issued)?;

        Ok(Self {
            app_key: app_key.to_string(),
            pin: pin.to_string(),
            initial_code: initial_code.to_string(),
            access_token: grant.access_token.clone(),
            token_type: grant
                .token_type
                .clone()
                .unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: grant.refresh_token.clone().unwrap_or_default(),
            scope: grant.scope.clone().unwrap_or_default(),
            issued,
            expires_at,
        })
    }

    /// Builds the successor of `self` from a refresh grant.
    ///
    /// Identity and audit fields are carried over; the refresh token is
    /// replaced only when the provider rotated it.
    ///
    /// # Errors
    ///
    /// Returns [`CobeeError::InvalidToken`] when the grant carries an empty
    /// access token or no usable `expires_in`.
    pub fn refreshed(&self, grant: &TokenGrant, issued: i64) -> Result<Self> {
        let expires_at = grant.expires_at_from(issued)?;

        Ok(Self {
            app_key: self.app_key.clone(),
            pin: self.pin.clone(),
            initial_code: self.initial_code.clone(),
            access_token: grant.access_token.clone(),
            token_type: grant
                .token_type
                .clone()
                .unwrap_or_else(|| self.token_type.clone()),
            refresh_token: grant
                .refresh_token
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| self.refresh_token.clone()),
            scope: grant.scope.clone().unwrap_or_else(|| self.scope.clone()),
            issued,
            expires_at,
        })
    }

    /// Validity duration this snapshot was issued with.
    pub fn expires_in(&self) -> i64 {
        self.expires_at - self.issued
    }

    /// Returns `true` once `at` reaches `expires_at - leeway`.
    pub fn is_expired_at(&self, at: i64, leeway: i64) -> bool {
        at >= self.expires_at - leeway
    }

    /// Returns `true` when the token is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now(), 0)
    }

    /// Expiry as a UTC timestamp, for display.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// Issuance as a UTC timestamp, for display.
    pub fn issued_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.issued, 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> TokenGrant {
        TokenGrant {
            access_token: access.to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in,
            refresh_token: refresh.map(str::to_string),
            scope: Some("smartRead,smartWrite".to_string()),
        }
    }

    #[test]
    fn test_authorized_derives_expires_at() {
        let token = Token::authorized("app", "ABC1", "xyz", &grant("t1", Some("r1"), Some(3600)), 1000)
            .expect("token");
        assert_eq!(token.issued, 1000);
        assert_eq!(token.expires_at, 4600);
        assert_eq!(token.expires_in(), 3600);
        assert_eq!(token.pin, "ABC1");
        assert_eq!(token.initial_code, "xyz");
        assert_eq!(token.refresh_token, "r1");
    }

    #[test]
    fn test_authorized_rejects_empty_access_token() {
        let err = Token::authorized("app", "p", "c", &grant("", Some("r1"), Some(10)), 0)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CobeeError>(),
            Some(CobeeError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_authorized_rejects_missing_expires_in() {
        assert!(Token::authorized("app", "p", "c", &grant("t", None, None), 0).is_err());
    }

    #[test]
    fn test_refreshed_keeps_identity_and_rotates_credentials() {
        let first = Token::authorized("app", "ABC1", "xyz", &grant("t1", Some("r1"), Some(3600)), 1000)
            .expect("first");
        let second = first
            .refreshed(&grant("t2", Some("r2"), Some(1800)), 5000)
            .expect("second");

        assert_eq!(second.app_key, "app");
        assert_eq!(second.pin, "ABC1");
        assert_eq!(second.initial_code, "xyz");
        assert_eq!(second.access_token, "t2");
        assert_eq!(second.refresh_token, "r2");
        assert_eq!(second.expires_at, 6800);
        // The superseded value is untouched.
        assert_eq!(first.access_token, "t1");
        assert_eq!(first.expires_at, 4600);
    }

    #[test]
    fn test_refreshed_keeps_refresh_token_when_not_rotated() {
        let first = Token::authorized("app", "p", "c", &grant("t1", Some("r1"), Some(60)), 0)
            .expect("first");
        let mut g = grant("t2", None, Some(60));
        g.scope = None;
        let second = first.refreshed(&g, 100).expect("second");
        assert_eq!(second.refresh_token, "r1");
        assert_eq!(second.scope, "smartRead,smartWrite");
    }

    #[test]
    fn test_huge_expires_in_is_rejected() {
        let g = grant("t1", Some("r1"), Some(i64::MAX));
        let err = Token::authorized("app", "p", "c", &g, 1_700_000_000).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CobeeError>(),
            Some(CobeeError::InvalidToken(_))
        ));

        let current = Token::authorized("app", "p", "c", &grant("t1", Some("r1"), Some(60)), 0)
            .expect("token");
        assert!(current.refreshed(&g, 1_700_000_000).is_err());
    }

    #[test]
    fn test_is_expired_at_boundary() {
        let token = Token::authorized("app", "p", "c", &grant("t", Some("r"), Some(100)), 0)
            .expect("token");
        assert!(!token.is_expired_at(99, 0));
        assert!(token.is_expired_at(100, 0));
        assert!(token.is_expired_at(40, 60));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let token = Token::authorized("app", "SECRETPIN", "secretcode", &grant("secretaccess", Some("secretrefresh"), Some(60)), 0)
            .expect("token");
        let dbg = format!("{token:?}");
        assert!(!dbg.contains("SECRETPIN"));
        assert!(!dbg.contains("secretcode"));
        assert!(!dbg.contains("secretaccess"));
        assert!(!dbg.contains("secretrefresh"));
        assert!(dbg.contains("app"));
    }

    #[test]
    fn test_grant_deserializes_minimal_body() {
        let g: TokenGrant = serde_json::from_value(serde_json::json!({
            "access_token": "t2",
            "expires_in": 3600
        }))
        .expect("deserialize");
        assert_eq!(g.access_token, "t2");
        assert!(g.refresh_token.is_none());
    }
}
