//! ecobee PIN authorization flow
//!
//! Drives the first grant of an application:
//!
//! 1. `Init → AwaitingPin`: ask the authorization endpoint for a PIN and a
//!    redeemable code.  Failure here is fatal and never retried.
//! 2. `AwaitingPin → Polling`: show the PIN to the operator once.  The
//!    operator enters it in the ecobee portal out-of-band; the flow does not
//!    wait for confirmation, it polls.
//! 3. `Polling`: redeem the code at the token endpoint at most
//!    `max_retries + 1` times, sleeping the poll interval between pending
//!    answers.  Any answer other than pending ends the loop immediately.
//! 4. `Authorized` or `Failed`, both terminal.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::client::{OAuthClient, PinGrant, TokenPoll, TokenRequest};
use crate::auth::token::{self, Token};
use crate::error::{CobeeError, Result};

/// Extra delay added to the interval on every `slow_down` answer.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// FlowSettings
// ---------------------------------------------------------------------------

/// Tunables of one authorization run.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Scope requested from the authorization endpoint.
    pub scope: String,

    /// Number of retries after the first poll.  The token endpoint is asked
    /// at most `max_retries + 1` times.
    pub max_retries: u32,

    /// Sleep between pending polls.
    pub poll_interval: Duration,

    /// Prefer the `interval` sent by the authorization endpoint over
    /// `poll_interval` when present.
    pub respect_provider_interval: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            scope: "smartRead,smartWrite".to_string(),
            max_retries: 5,
            poll_interval: Duration::from_secs(60),
            respect_provider_interval: true,
        }
    }
}

// ---------------------------------------------------------------------------
// FlowState
// ---------------------------------------------------------------------------

/// Position of an [`AuthorizationFlow`] in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Nothing requested yet.
    Init,
    /// PIN received and shown to the operator.
    AwaitingPin,
    /// Redeeming the code; `attempt` counts token requests made so far.
    Polling {
        /// 1-based number of the current token request.
        attempt: u32,
    },
    /// A token was issued.
    Authorized,
    /// The run ended without a token.
    Failed,
}

/// Callback that shows the PIN to the operator.
pub type PinPrompt = Arc<dyn Fn(&PinGrant) + Send + Sync>;

/// Default prompt: one line on stderr.
pub fn stderr_prompt() -> PinPrompt {
    Arc::new(|grant: &PinGrant| {
        eprintln!(
            "Please enter the following PIN under My Apps in your ecobee account: {}",
            grant.pin
        );
        if let Some(minutes) = grant.expires_in_minutes {
            eprintln!("The PIN expires in {minutes} minutes.");
        }
    })
}

// ---------------------------------------------------------------------------
// AuthorizationFlow
// ---------------------------------------------------------------------------

/// State machine for the initial PIN grant.
///
/// The flow does not persist anything; the produced [`Token`] is handed to
/// the caller.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use cobee::auth::client::OAuthClient;
/// use cobee::auth::flow::{AuthorizationFlow, FlowSettings, FlowState};
///
/// # async fn example() -> cobee::error::Result<()> {
/// let client = OAuthClient::new(Arc::new(reqwest::Client::new()), "https://api.ecobee.com", "app")?;
/// let mut flow = AuthorizationFlow::new(client, FlowSettings::default());
/// let token = flow.run().await?;
/// assert_eq!(flow.state(), FlowState::Authorized);
/// println!("token expires at {}", token.expires_at);
/// # Ok(())
/// # }
/// ```
pub struct AuthorizationFlow {
    client: OAuthClient,
    settings: FlowSettings,
    prompt: PinPrompt,
    state: FlowState,
}

impl AuthorizationFlow {
    /// Creates a flow in the `Init` state that prompts on stderr.
    pub fn new(client: OAuthClient, settings: FlowSettings) -> Self {
        Self {
            client,
            settings,
            prompt: stderr_prompt(),
            state: FlowState::Init,
        }
    }

    /// Replaces the PIN prompt.
    pub fn with_prompt(mut self, prompt: PinPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Runs the flow to a terminal state.
    ///
    /// # Errors
    ///
    /// - [`CobeeError::AuthorizationRequest`] when the authorization endpoint
    ///   fails.
    /// - [`CobeeError::AuthorizationTimeout`] when polling ends without a
    ///   grant, either because the retry budget ran out or because the token
    ///   endpoint answered with a hard error.
    /// - [`CobeeError::InvalidToken`] when the grant cannot form a token.
    pub async fn run(&mut self) -> Result<Token> {
        self.state = FlowState::Init;

        let grant = match self.client.authorize(&self.settings.scope).await {
            Ok(grant) => grant,
            Err(e) => {
                self.state = FlowState::Failed;
                tracing::warn!("Authorization request failed: {e}");
                return Err(e);
            }
        };

        self.state = FlowState::AwaitingPin;
        tracing::info!("Received authorization PIN; waiting for operator approval");
        (self.prompt)(&grant);

        self.poll(&grant).await
    }

    async fn poll(&mut self, grant: &PinGrant) -> Result<Token> {
        let total = self.settings.max_retries.saturating_add(1);
        let mut interval = self.initial_interval(grant);

        for attempt in 1..=total {
            self.state = FlowState::Polling { attempt };
            tracing::debug!(attempt, total, "Polling token endpoint");

            let answer = match self
                .client
                .request_token(TokenRequest::Pin { code: &grant.code })
                .await
            {
                Ok(answer) => answer,
                Err(e) => return Err(self.fail(attempt, format!("token request failed: {e}"))),
            };

            match answer {
                TokenPoll::Granted(token_grant) => {
                    let token = Token::authorized(
                        self.client.app_key(),
                        &grant.pin,
                        &grant.code,
                        &token_grant,
                        token::now(),
                    );
                    return match token {
                        Ok(token) => {
                            self.state = FlowState::Authorized;
                            tracing::info!(attempt, expires_at = token.expires_at, "Authorization granted");
                            Ok(token)
                        }
                        Err(e) => {
                            self.state = FlowState::Failed;
                            Err(e)
                        }
                    };
                }
                TokenPoll::Pending => {
                    tracing::debug!("authorization_pending; continuing to poll");
                }
                TokenPoll::SlowDown => {
                    interval += SLOW_DOWN_STEP;
                    tracing::debug!(?interval, "slow_down received; backing off");
                }
                TokenPoll::Rejected { error, description } => {
                    let message = match description {
                        Some(d) => format!("provider returned {error}: {d}"),
                        None => format!("provider returned {error}"),
                    };
                    return Err(self.fail(attempt, message));
                }
            }

            if attempt < total {
                tokio::time::sleep(interval).await;
            }
        }

        Err(self.fail(total, "authorization still pending".to_string()))
    }

    fn initial_interval(&self, grant: &PinGrant) -> Duration {
        match grant.interval {
            Some(secs) if self.settings.respect_provider_interval && secs > 0 => {
                Duration::from_secs(secs)
            }
            _ => self.settings.poll_interval,
        }
    }

    fn fail(&mut self, attempts: u32, message: String) -> anyhow::Error {
        self.state = FlowState::Failed;
        tracing::warn!(attempts, "Authorization failed: {message}");
        CobeeError::AuthorizationTimeout { attempts, message }.into()
    }
}
