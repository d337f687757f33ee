//! Test utilities for Cobee
//!
//! This module provides token fixtures, offline configurations, and
//! assertion helpers shared by the unit tests.

use crate::auth::token::Token;
use crate::config::Config;

/// Build a token issued at `issued` that lives `expires_in` seconds
///
/// The refresh token is derived from `access` so each fixture is distinct.
///
/// # Examples
///
/// ```ignore
/// let token = sample_token("app", "t1", 1_000, 3600);
/// assert_eq!(token.expires_at, 4_600);
/// ```
pub fn sample_token(app_key: &str, access: &str, issued: i64, expires_in: i64) -> Token {
    Token {
        app_key: app_key.to_string(),
        pin: "ABC1".to_string(),
        initial_code: "xyz".to_string(),
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: format!("refresh-for-{access}"),
        scope: "smartRead,smartWrite".to_string(),
        issued,
        expires_at: issued + expires_in,
    }
}

/// Configuration whose API base URL refuses every connection
///
/// Any test that accidentally reaches the network fails fast instead of
/// hanging.
pub fn unreachable_config(app_key: &str) -> Config {
    let mut config = Config::new(app_key);
    config.api.base_url = "http://127.0.0.1:9".to_string();
    config.api.timeout_seconds = 2;
    config.auth.poll_interval_seconds = 1;
    config.auth.max_retries = 0;
    config.storage.backend = "memory://".to_string();
    config
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: crate::error::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CobeeError;

    #[test]
    fn test_sample_token_expiry() {
        let token = sample_token("app", "t1", 1_000, 3600);
        assert_eq!(token.expires_at, 4_600);
        assert_eq!(token.expires_in(), 3600);
    }

    #[test]
    fn test_unreachable_config_validates() {
        assert!(unreachable_config("app").validate().is_ok());
    }

    #[test]
    fn test_assert_error_contains() {
        let result: crate::error::Result<()> =
            Err(CobeeError::Config("invalid".to_string()).into());
        assert_error_contains(result, "invalid");
    }
}
