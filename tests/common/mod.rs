//! Shared fixtures for the integration tests.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use wiremock::ResponseTemplate;

use cobee::auth::client::PinGrant;
use cobee::auth::flow::PinPrompt;
use cobee::auth::token::Token;
use cobee::backends::{Backend, MemoryBackend};
use cobee::config::Config;
use cobee::error::{CobeeError, Result};

/// Config pointing at `base_url` with instant polling.
#[allow(dead_code)]
pub fn mock_config(base_url: &str, max_retries: u32) -> Config {
    let mut config = Config::new("test-app-key");
    config.api.base_url = base_url.to_string();
    config.api.timeout_seconds = 5;
    config.auth.max_retries = max_retries;
    config.auth.poll_interval_seconds = 0;
    config.storage.backend = "memory://".to_string();
    config
}

/// `/authorize` answer with PIN `ABC1` and code `xyz`.
#[allow(dead_code)]
pub fn pin_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "ecobeePin": "ABC1",
        "code": "xyz",
        "scope": "smartWrite",
        "expires_in": 9
    }))
}

/// `/token` answer while the PIN is not yet entered.
#[allow(dead_code)]
pub fn pending_response() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(serde_json::json!({
        "error": "authorization_pending",
        "error_description": "Waiting for user to authorize application."
    }))
}

/// `/token` answer carrying a credential.
#[allow(dead_code)]
pub fn grant_response(access: &str, refresh: &str, expires_in: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "refresh_token": refresh,
        "scope": "smartWrite"
    }))
}

/// Prompt that records every PIN it is shown.
#[allow(dead_code)]
pub fn recording_prompt() -> (PinPrompt, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let prompt: PinPrompt = Arc::new(move |grant: &PinGrant| {
        sink.lock().expect("prompt lock").push(grant.pin.clone());
    });
    (prompt, seen)
}

/// Token fixture for `app_key` issued at `issued`.
#[allow(dead_code)]
pub fn stored_token(app_key: &str, access: &str, refresh: &str, issued: i64, expires_in: i64) -> Token {
    Token {
        app_key: app_key.to_string(),
        pin: "ABC1".to_string(),
        initial_code: "xyz".to_string(),
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: refresh.to_string(),
        scope: "smartWrite".to_string(),
        issued,
        expires_at: issued + expires_in,
    }
}

/// Backend whose `save` always fails while reads go to a shared memory slot.
#[allow(dead_code)]
pub struct FailingSaveBackend {
    inner: MemoryBackend,
}

#[allow(dead_code)]
impl FailingSaveBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl Backend for FailingSaveBackend {
    async fn ensure_schema(&self) -> Result<()> {
        self.inner.ensure_schema().await
    }

    async fn load(&self) -> Result<Option<Token>> {
        self.inner.load().await
    }

    async fn save(&self, _token: &Token) -> Result<()> {
        Err(CobeeError::BackendPersistence("disk full".to_string()).into())
    }

    async fn delete(&self) -> Result<()> {
        self.inner.delete().await
    }

    fn describe(&self) -> String {
        format!("failing({})", self.inner.describe())
    }
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("cobee.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
