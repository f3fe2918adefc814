//! Supabase Auth (GoTrue) client.
//!
//! Implements [`IdentityProvider`] over the GoTrue REST API. Like the
//! official GoTrue clients it keeps an in-memory "current session" that it
//! updates on its own calls; that is what `get_active_session` returns.
//!
//! Provider-pushed events are things this process did not do: a session
//! handed over by another surface ([`SupabaseAuthClient::announce`]), or a
//! revocation detected by [`SupabaseAuthClient::watch_revocation`] (another
//! device signed this account out everywhere).

use crate::{AuthError, AuthResult, IdentityProvider, ProviderEvent, ProviderResponse, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Capacity of the provider event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Skip revocation checks for tokens this close to expiry; an expired JWT
/// is rejected the same way a revoked one is.
const REVOCATION_CHECK_MARGIN: Duration = Duration::from_secs(30);

/// Token grant response (`/token`, and `/signup` when autoconfirm is on).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<User>,
}

impl TokenResponse {
    fn into_session(self) -> AuthResult<Session> {
        let mut session = Session::new(self.access_token, self.refresh_token)?;

        if let Some(expires_at) = resolve_expiry(self.expires_at, self.expires_in, Utc::now()) {
            session = session.with_expires_at(expires_at);
        }
        if let Some(user) = self.user {
            session = session.with_user(user);
        }

        Ok(session)
    }
}

/// GoTrue error body; field names differ between API versions.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn message(&self, status: StatusCode) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error_code.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("HTTP {}", status))
    }
}

/// Which call a failed response belongs to; decides the error mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    SignIn,
    SignUp,
    Refresh,
    SignOut,
    User,
}

/// Map a non-success status to the error taxonomy.
fn classify_failure(call: Call, status: StatusCode, message: String) -> AuthError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::Network(format!("HTTP {}: {}", status, message));
    }

    match (call, status.as_u16()) {
        (Call::SignIn, 400 | 401 | 422) | (Call::SignUp, 400 | 422) => {
            AuthError::InvalidCredentials(message)
        }
        (Call::Refresh, 400 | 401 | 403 | 404) => AuthError::InvalidRefreshCredential(message),
        (Call::User | Call::SignOut, 401 | 403 | 404) => AuthError::InvalidCredentials(message),
        _ => AuthError::UnexpectedResponse(format!("HTTP {}: {}", status, message)),
    }
}

/// Absolute expiry from GoTrue's `expires_at` (preferred) or `expires_in`.
///
/// Values outside chrono's range read as no known expiry.
fn resolve_expiry(
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    expires_at
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            expires_in
                .and_then(ChronoDuration::try_seconds)
                .and_then(|delta| now.checked_add_signed(delta))
        })
}

/// Sign-up returns a token response when a session is issued immediately,
/// and the bare user record when confirmation is pending.
fn parse_sign_up_body(body: serde_json::Value) -> AuthResult<ProviderResponse> {
    if body.get("access_token").is_some() {
        let token: TokenResponse = serde_json::from_value(body)?;
        let session = token.into_session()?;
        return Ok(ProviderResponse {
            user: session.user().cloned(),
            session: Some(session),
        });
    }

    let user: User = serde_json::from_value(body)?;
    Ok(ProviderResponse {
        session: None,
        user: Some(user),
    })
}

/// Supabase Auth client.
pub struct SupabaseAuthClient {
    http_client: reqwest::Client,
    auth_url: String,
    publishable_key: String,
    current: Mutex<Option<Session>>,
    /// Bumped on every sign-out, under the `current` lock.
    sign_outs: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl SupabaseAuthClient {
    /// Create a client for the project at `supabase_url`.
    pub fn new(
        supabase_url: &str,
        publishable_key: impl Into<String>,
        timeout: Duration,
    ) -> AuthResult<Self> {
        let parsed = Url::parse(supabase_url)?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http_client,
            auth_url: format!("{}/auth/v1", parsed.as_str().trim_end_matches('/')),
            publishable_key: publishable_key.into(),
            current: Mutex::new(None),
            sign_outs: AtomicU64::new(0),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_url, path)
    }

    fn current(&self) -> MutexGuard<'_, Option<Session>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the current session and invalidate refreshes started before now.
    fn forget_current(&self) -> Option<Session> {
        let mut current = self.current();
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        current.take()
    }

    /// Make `session` current unless a sign-out happened after `observed`.
    fn adopt_refreshed(&self, session: &Session, observed: u64) -> bool {
        let mut current = self.current();
        if self.sign_outs.load(Ordering::SeqCst) != observed {
            debug!("Signed out during refresh, not adopting refreshed session");
            return false;
        }
        *current = Some(session.clone());
        true
    }

    /// Hand over a session or sign-out that originated outside this process
    /// (deep link, another surface sharing the account).
    pub fn announce(&self, event: ProviderEvent) {
        match &event {
            ProviderEvent::SignedIn(session) => *self.current() = Some(session.clone()),
            ProviderEvent::SignedOut => {
                self.forget_current();
            }
        }

        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(event);
    }

    /// Poll the provider for remote revocation of the current session.
    ///
    /// When the provider rejects a still-unexpired access credential, the
    /// session was ended elsewhere and a `SignedOut` event is published.
    /// Abort the returned handle to stop polling.
    pub fn watch_revocation(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let client = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(client) = client.upgrade() else {
                    debug!("Auth client dropped, stopping revocation watch");
                    return;
                };
                client.check_revocation().await;
            }
        })
    }

    async fn check_revocation(&self) {
        let token = {
            let current = self.current();
            match current.as_ref() {
                Some(session) if !session.is_expired_within(REVOCATION_CHECK_MARGIN) => {
                    session.access_token().to_string()
                }
                _ => return,
            }
        };

        match self.fetch_user(&token).await {
            Ok(user) => debug!(user_id = %user.id, "Remote session still valid"),
            Err(AuthError::InvalidCredentials(message)) => {
                let still_current = self
                    .current()
                    .as_ref()
                    .map(|s| s.access_token() == token)
                    .unwrap_or(false);
                if still_current {
                    info!(reason = %message, "Remote session revoked");
                    self.announce(ProviderEvent::SignedOut);
                }
            }
            Err(e) => debug!(error = %e, "Revocation check inconclusive"),
        }
    }

    /// Fetch the user behind an access credential.
    pub async fn fetch_user(&self, access_token: &str) -> AuthResult<User> {
        let response = self
            .http_client
            .get(self.endpoint("user"))
            .header("apikey", &self.publishable_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::check_status(Call::User, response).await?;
        Ok(response.json().await?)
    }

    async fn check_status(call: Call, response: reqwest::Response) -> AuthResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = ErrorBody::parse(&body).message(status);
        warn!(call = ?call, status = %status, message = %message, "Auth request failed");

        Err(classify_failure(call, status, message))
    }

    async fn token_grant(&self, grant_type: &str, call: Call, body: serde_json::Value) -> AuthResult<Session> {
        let url = format!("{}?grant_type={}", self.endpoint("token"), grant_type);
        debug!(url = %url, "Requesting token grant");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .json(&body)
            .send()
            .await?;

        let response = Self::check_status(call, response).await?;
        let token: TokenResponse = response.json().await?;
        token.into_session()
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn password_sign_in(&self, identifier: &str, secret: &str) -> AuthResult<ProviderResponse> {
        let session = self
            .token_grant(
                "password",
                Call::SignIn,
                serde_json::json!({ "email": identifier, "password": secret }),
            )
            .await?;

        *self.current() = Some(session.clone());

        Ok(ProviderResponse {
            user: session.user().cloned(),
            session: Some(session),
        })
    }

    async fn password_sign_up(
        &self,
        identifier: &str,
        secret: &str,
        attributes: Option<serde_json::Value>,
    ) -> AuthResult<ProviderResponse> {
        let mut body = serde_json::json!({ "email": identifier, "password": secret });
        if let Some(attributes) = attributes {
            body["data"] = attributes;
        }

        let response = self
            .http_client
            .post(self.endpoint("signup"))
            .header("apikey", &self.publishable_key)
            .json(&body)
            .send()
            .await?;

        let response = Self::check_status(Call::SignUp, response).await?;
        let parsed = parse_sign_up_body(response.json().await?)?;

        if let Some(session) = &parsed.session {
            *self.current() = Some(session.clone());
        } else {
            info!("Sign-up created a user pending confirmation");
        }

        Ok(parsed)
    }

    async fn refresh_session(&self, refresh_credential: &str) -> AuthResult<Session> {
        let observed = self.sign_outs.load(Ordering::SeqCst);
        let session = self
            .token_grant(
                "refresh_token",
                Call::Refresh,
                serde_json::json!({ "refresh_token": refresh_credential }),
            )
            .await?;

        self.adopt_refreshed(&session, observed);
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let Some(session) = self.forget_current() else {
            debug!("No current session, nothing to sign out remotely");
            return Ok(());
        };

        let response = self
            .http_client
            .post(self.endpoint("logout"))
            .header("apikey", &self.publishable_key)
            .bearer_auth(session.access_token())
            .send()
            .await?;

        match Self::check_status(Call::SignOut, response).await {
            Ok(_) => Ok(()),
            // Already gone on the server side.
            Err(AuthError::InvalidCredentials(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_active_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.current().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
