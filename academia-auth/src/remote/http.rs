//! GoTrue-compatible identity service client
//!
//! Endpoints used:
//! - `POST auth/v1/token?grant_type=password`
//! - `POST auth/v1/token?grant_type=refresh_token`
//! - `POST auth/v1/signup`
//! - `POST auth/v1/logout`
//!
//! The client keeps the current session in memory and publishes
//! session-change notifications on its own broadcast channel. Request
//! timeouts are enforced here.

use super::EVENT_CHANNEL_CAPACITY;
use crate::transport::{endpoint, error_from_response, parse_base_url, transport_error};
use academia_core::{
    async_trait, with_timeout, AuthError, AuthResult, RemoteConfig, RemoteIdentityService,
    RemoteSession, RemoteUser, SessionEvent,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;

/// Token endpoint payload
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds until expiry
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix timestamp of expiry
    #[serde(default)]
    expires_at: Option<i64>,
    user: RemoteUser,
}

impl TokenResponse {
    fn into_session(self) -> RemoteSession {
        let expires_at: Option<DateTime<Utc>> = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + Duration::seconds(secs))
            });

        RemoteSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a Map<String, Value>,
}

pub struct HttpIdentityService {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout_ms: u64,
    current: RwLock<Option<RemoteSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl HttpIdentityService {
    pub fn new(config: &RemoteConfig) -> AuthResult<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: &RemoteConfig, client: reqwest::Client) -> AuthResult<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            client,
            base_url: parse_base_url(&config.base_url)?,
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
            current: RwLock::new(None),
            events,
        })
    }

    /// Adopt a session persisted by the host application in a previous run.
    ///
    /// Subscribers are not notified; the next `current_session` call returns it.
    pub async fn restore_session(&self, session: RemoteSession) {
        *self.current.write().await = Some(session);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        grant_type: Option<&str>,
        bearer: Option<&str>,
        body: &B,
        operation: &str,
    ) -> AuthResult<reqwest::Response> {
        let url = endpoint(&self.base_url, path)?;
        let mut request = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .json(body);
        if let Some(grant_type) = grant_type {
            request = request.query(&[("grant_type", grant_type)]);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = with_timeout(
            async { request.send().await.map_err(transport_error) },
            self.timeout_ms,
            operation,
        )
        .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn token_grant<B: Serialize>(
        &self,
        grant_type: &str,
        body: &B,
        operation: &str,
    ) -> AuthResult<RemoteSession> {
        let response = self
            .post_json("auth/v1/token", Some(grant_type), None, body, operation)
            .await?;
        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthError::unavailable_with_source(
                format!("Malformed token response: {}", e),
                Box::new(e),
            )
        })?;
        Ok(token.into_session())
    }
}

#[async_trait]
impl RemoteIdentityService for HttpIdentityService {
    async fn current_session(&self) -> AuthResult<Option<RemoteSession>> {
        let session = self.current.read().await.clone();
        match session {
            Some(session) if session.is_expired() => {
                if session.refresh_token.is_none() {
                    debug!("Stored session expired without refresh token");
                    *self.current.write().await = None;
                    return Ok(None);
                }
                match self.refresh_session().await {
                    Ok(refreshed) => Ok(Some(refreshed)),
                    Err(AuthError::Rejected { message }) => {
                        warn!(error = %message, "Expired session could not be refreshed");
                        *self.current.write().await = None;
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            other => Ok(other),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<RemoteSession> {
        let session = self
            .token_grant("password", &PasswordGrant { email, password }, "sign_in")
            .await?;

        *self.current.write().await = Some(session.clone());
        info!(user_id = %session.user.id, "Signed in with identity service");
        self.emit(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> AuthResult<()> {
        self.post_json(
            "auth/v1/signup",
            None,
            None,
            &SignUpRequest {
                email,
                password,
                data: &metadata,
            },
            "sign_up",
        )
        .await?;
        info!("Sign-up accepted by identity service");
        Ok(())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let token = self
            .current
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone());

        if let Some(token) = token {
            let body = serde_json::json!({});
            let logout = self
                .post_json(
                    "auth/v1/logout",
                    None,
                    Some(token.as_str()),
                    &body,
                    "sign_out",
                )
                .await;
            match logout {
                Ok(_) => {}
                // The token is already dead on the server; the local session ends anyway
                Err(AuthError::Rejected { message }) => {
                    debug!(error = %message, "Logout rejected, dropping local session");
                }
                Err(e) => return Err(e),
            }
        }

        *self.current.write().await = None;
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    async fn refresh_session(&self) -> AuthResult<RemoteSession> {
        let refresh_token = self
            .current
            .read()
            .await
            .as_ref()
            .and_then(|session| session.refresh_token.clone())
            .ok_or_else(|| AuthError::rejected("No active session"))?;

        let session = self
            .token_grant(
                "refresh_token",
                &RefreshGrant {
                    refresh_token: &refresh_token,
                },
                "refresh_session",
            )
            .await?;

        *self.current.write().await = Some(session.clone());
        debug!(user_id = %session.user.id, "Session token refreshed");
        self.emit(SessionEvent::token_refreshed(session.clone()));
        Ok(session)
    }
}
