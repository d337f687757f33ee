//! PIN authorization flow integration tests using wiremock
//!
//! Verifies `src/auth/flow.rs` end to end against a mock ecobee API:
//!
//! - The first grant produces a token carrying the PIN, code and credential.
//! - Pending answers are polled through until a grant arrives.
//! - Polling stops after `max_retries + 1` attempts.
//! - A hard error from the token endpoint stops polling immediately.
//! - `slow_down` keeps polling with a longer interval.
//! - A transport failure while polling ends the flow at that attempt.
//! - An authorization endpoint failure never reaches the token endpoint.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cobee::auth::client::OAuthClient;
use cobee::auth::flow::{AuthorizationFlow, FlowSettings, FlowState};
use cobee::error::CobeeError;

use common::{grant_response, pending_response, pin_response, recording_prompt};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_flow(server: &MockServer, max_retries: u32) -> AuthorizationFlow {
    make_flow_with_http(server, max_retries, reqwest::Client::new())
}

fn make_flow_with_http(
    server: &MockServer,
    max_retries: u32,
    http: reqwest::Client,
) -> AuthorizationFlow {
    let client = OAuthClient::new(Arc::new(http), &server.uri(), "test-app-key").expect("client");
    let settings = FlowSettings {
        scope: "smartWrite".to_string(),
        max_retries,
        poll_interval: Duration::ZERO,
        respect_provider_interval: true,
    };
    let (prompt, _) = recording_prompt();
    AuthorizationFlow::new(client, settings).with_prompt(prompt)
}

async fn mount_authorize(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/authorize"))
        .and(query_param("response_type", "ecobeePin"))
        .and(query_param("client_id", "test-app-key"))
        .and(query_param("scope", "smartWrite"))
        .respond_with(pin_response())
        .expect(1)
        .mount(server)
        .await;
}

fn timeout_attempts(err: &anyhow::Error) -> Option<u32> {
    match err.downcast_ref::<CobeeError>() {
        Some(CobeeError::AuthorizationTimeout { attempts, .. }) => Some(*attempts),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Success paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_first_grant_builds_token() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(query_param("grant_type", "ecobeePin"))
        .and(query_param("code", "xyz"))
        .and(query_param("client_id", "test-app-key"))
        .and(query_param("ecobee_type", "jwt"))
        .respond_with(grant_response("t1", "r1", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = make_flow(&server, 5);
    let token = flow.run().await.expect("authorization should succeed");

    assert_eq!(flow.state(), FlowState::Authorized);
    assert_eq!(token.app_key, "test-app-key");
    assert_eq!(token.pin, "ABC1");
    assert_eq!(token.initial_code, "xyz");
    assert_eq!(token.access_token, "t1");
    assert_eq!(token.refresh_token, "r1");
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.expires_in(), 3600);
    assert_eq!(token.expires_at, token.issued + 3600);
}

#[tokio::test]
async fn test_pending_polls_until_granted() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(pending_response())
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(grant_response("t1", "r1", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = make_flow(&server, 5);
    let token = flow.run().await.expect("authorization should succeed");
    assert_eq!(token.access_token, "t1");
    assert_eq!(flow.state(), FlowState::Authorized);
}

#[tokio::test]
async fn test_prompt_shows_pin_once() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(pending_response())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(grant_response("t1", "r1", 3600))
        .mount(&server)
        .await;

    let (prompt, seen) = recording_prompt();
    let mut flow = make_flow(&server, 5).with_prompt(prompt);
    flow.run().await.expect("authorization should succeed");

    assert_eq!(*seen.lock().unwrap(), vec!["ABC1".to_string()]);
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_always_pending_stops_after_max_retries_plus_one() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(pending_response())
        .expect(3)
        .mount(&server)
        .await;

    let mut flow = make_flow(&server, 2);
    let err = flow.run().await.unwrap_err();

    assert_eq!(timeout_attempts(&err), Some(3));
    assert_eq!(flow.state(), FlowState::Failed);
}

#[tokio::test]
async fn test_zero_retries_polls_exactly_once() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(pending_response())
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = make_flow(&server, 0);
    let err = flow.run().await.unwrap_err();
    assert_eq!(timeout_attempts(&err), Some(1));
}

#[tokio::test]
async fn test_hard_error_aborts_after_one_poll() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_client",
            "error_description": "Invalid client id"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = make_flow(&server, 5);
    let err = flow.run().await.unwrap_err();

    assert_eq!(timeout_attempts(&err), Some(1));
    assert!(err.to_string().contains("invalid_client"));
    assert_eq!(flow.state(), FlowState::Failed);
}

#[tokio::test]
async fn test_authorize_failure_never_polls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/authorize"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(grant_response("t1", "r1", 3600))
        .expect(0)
        .mount(&server)
        .await;

    let mut flow = make_flow(&server, 5);
    let err = flow.run().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CobeeError>(),
        Some(CobeeError::AuthorizationRequest(_))
    ));
    assert_eq!(flow.state(), FlowState::Failed);
}

#[tokio::test]
async fn test_grant_without_expiry_is_rejected() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "t1",
            "refresh_token": "r1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = make_flow(&server, 5);
    let err = flow.run().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CobeeError>(),
        Some(CobeeError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_slow_down_counts_as_pending_and_backs_off() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "slow_down"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(grant_response("t1", "r1", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    let mut flow = make_flow(&server, 1);
    let token = flow.run().await.expect("authorization should succeed");

    assert_eq!(token.access_token, "t1");
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn test_transport_failure_while_polling_ends_with_timeout() {
    let server = MockServer::start().await;
    mount_authorize(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(grant_response("t1", "r1", 3600).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&server)
        .await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .expect("http client");
    let mut flow = make_flow_with_http(&server, 3, http);
    let err = flow.run().await.unwrap_err();

    assert_eq!(timeout_attempts(&err), Some(1));
    assert!(err.to_string().contains("token request failed"));
    assert_eq!(flow.state(), FlowState::Failed);
}
