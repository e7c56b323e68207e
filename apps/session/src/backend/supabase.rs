//! HTTPS implementation of `BackendClient` for the hosted backend:
//! token-based auth under `/auth/v1`, PostgREST tables under `/rest/v1`,
//! edge functions under `/functions/v1`.
//!
//! The current session lives in memory only. Access tokens are refreshed on
//! demand when they are within `REFRESH_MARGIN_SECS` of expiry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::errors::{BackendError, ErrorKind};
use crate::models::{
    AuthEvent, AuthSession, AuthUser, NewProfile, Profile, ProfileUpdate, SignUpOutcome,
    Subscription, UserPreferences,
};

const REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const EVENT_CHANNEL_CAPACITY: usize = 32;
/// Makes PostgREST answer single-row reads with an object, or `PGRST116` when empty.
const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";
const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| {
                now + chrono::Duration::seconds(self.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS))
            });
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Union of the error shapes the auth, table and function endpoints return.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        if let Some(code) = &self.error_code {
            return Some(code.clone());
        }
        if let Some(Value::String(code)) = &self.code {
            return Some(code.clone());
        }
        // OAuth-style body: {"error": "invalid_grant", "error_description": "..."}
        if self.error_description.is_some() {
            return self.error.clone();
        }
        None
    }

    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

/// Passes successful responses through and turns everything else into a `BackendError`.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let code = parsed.code();
    let mut message = parsed.into_message().unwrap_or(body);
    if message.is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }

    Err(BackendError::from_response(status.as_u16(), code, message))
}

#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    anon_key: String,
    service_role_key: Option<String>,
    signup_redirect: String,
    reset_redirect: String,
    session: Arc<RwLock<Option<AuthSession>>>,
    /// Serializes token refreshes so one refresh token is spent once.
    refresh_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
            signup_redirect: config.signup_redirect(),
            reset_redirect: config.reset_password_redirect(),
            session: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            events,
        })
    }

    /// The session currently held in memory, if any.
    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// Exchanges the refresh token for a new access token.
    pub async fn refresh_session(&self) -> Result<AuthSession, BackendError> {
        let _refreshing = self.refresh_lock.lock().await;
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or_else(|| BackendError::new(ErrorKind::CredentialRejected, "Auth session missing!"))?;
        self.refresh_with(&refresh_token).await
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    fn emit(&self, event: AuthEvent) {
        debug!(?event, "Emitting auth event");
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    fn anon(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// Attaches the user's access token when signed in, the anon key otherwise.
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        let token = self
            .access_token()
            .await?
            .unwrap_or_else(|| self.anon_key.clone());
        Ok(request.header("apikey", &self.anon_key).bearer_auth(token))
    }

    async fn require_token(&self) -> Result<String, BackendError> {
        self.access_token()
            .await?
            .ok_or_else(|| BackendError::new(ErrorKind::CredentialRejected, "Auth session missing!"))
    }

    async fn access_token(&self) -> Result<Option<String>, BackendError> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have refreshed or dropped the session meanwhile.
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }
        let current = self.session.read().await.clone();
        match current {
            Some(session) => {
                let refreshed = self.refresh_with(&session.refresh_token).await?;
                Ok(Some(refreshed.access_token))
            }
            None => Ok(None),
        }
    }

    /// `Some(None)` when signed out, `Some(token)` when the token is still
    /// valid, `None` when it needs a refresh.
    async fn fresh_token(&self) -> Option<Option<String>> {
        match self.session.read().await.as_ref() {
            None => Some(None),
            Some(session) if session.expires_within(Utc::now(), REFRESH_MARGIN_SECS) => None,
            Some(session) => Some(Some(session.access_token.clone())),
        }
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let response = self
            .anon(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        match check(response).await {
            Ok(response) => {
                let token: TokenResponse = response.json().await?;
                let session = token.into_session(Utc::now());
                *self.session.write().await = Some(session.clone());
                debug!("Refreshed session for user {}", session.user.id);
                self.emit(AuthEvent::TokenRefreshed);
                Ok(session)
            }
            Err(e) if e.kind == ErrorKind::CredentialRejected => {
                warn!("Refresh token rejected, dropping local session: {e}");
                self.session.write().await.take();
                self.emit(AuthEvent::SignedOut);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn store_session(&self, token: TokenResponse) -> AuthSession {
        let session = token.into_session(Utc::now());
        *self.session.write().await = Some(session.clone());
        session
    }

    async fn revoke(&self, access_token: &str) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn put_user(&self, body: Value) -> Result<AuthUser, BackendError> {
        let token = self.require_token().await?;
        let response = self
            .http
            .put(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let user: AuthUser = check(response).await?.json().await?;

        if let Some(session) = self.session.write().await.as_mut() {
            session.user = user.clone();
        }
        self.emit(AuthEvent::UserUpdated);
        Ok(user)
    }

    async fn select_single<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: Uuid,
    ) -> Result<Option<T>, BackendError> {
        let request = self
            .http
            .get(self.rest_url(table))
            .query(&[(column, format!("eq.{value}")), ("select", "*".to_string())])
            .header("Accept", OBJECT_MEDIA_TYPE);
        let response = self.authorize(request).await?.send().await?;

        match check(response).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(e) if e.code.as_deref() == Some(NO_ROWS_CODE) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BackendClient for SupabaseClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let response = self
            .anon(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;

        let session = self.store_session(token).await;
        info!("Signed in user {}", session.user.id);
        self.emit(AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let response = self
            .anon(self.http.post(self.auth_url("signup")))
            .query(&[("redirect_to", self.signup_redirect.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name }
            }))
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;

        // Auto-confirmed projects answer with a full session; otherwise with the bare user.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            let session = self.store_session(token).await;
            self.emit(AuthEvent::SignedIn);
            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user: AuthUser = match body.get("user") {
            Some(user) if user.is_object() => serde_json::from_value(user.clone())?,
            _ => serde_json::from_value(body)?,
        };
        debug!("Created identity {} pending email confirmation", user.id);
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        let result = self.revoke(&session.access_token).await;
        self.emit(AuthEvent::SignedOut);
        result
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let token = match self.access_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(None),
            Err(e) if e.kind == ErrorKind::CredentialRejected => return Ok(None),
            Err(e) => return Err(e),
        };

        let response = self
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        match check(response).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(e) if e.kind == ErrorKind::CredentialRejected => {
                warn!("Session no longer valid: {e}");
                if self.session.write().await.take().is_some() {
                    self.emit(AuthEvent::SignedOut);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), BackendError> {
        let response = self
            .anon(self.http.post(self.auth_url("recover")))
            .query(&[("redirect_to", self.reset_redirect.as_str())])
            .json(&json!({ "email": email }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn update_auth_email(&self, email: &str) -> Result<AuthUser, BackendError> {
        self.put_user(json!({ "email": email })).await
    }

    async fn update_password(&self, password: &str) -> Result<(), BackendError> {
        self.put_user(json!({ "password": password })).await?;
        Ok(())
    }

    async fn delete_identity(&self, user_id: Uuid) -> Result<(), BackendError> {
        let key = self.service_role_key.as_ref().ok_or_else(|| {
            BackendError::new(
                ErrorKind::Unknown,
                "SUPABASE_SERVICE_ROLE_KEY is not configured; cannot delete identity",
            )
        })?;

        let response = self
            .http
            .delete(self.auth_url(&format!("admin/users/{user_id}")))
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        self.select_single("profiles", "id", user_id).await
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> Result<(), BackendError> {
        let request = self
            .http
            .post(self.rest_url("profiles"))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(profile);
        let response = self.authorize(request).await?.send().await?;
        check(response).await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<(), BackendError> {
        let request = self
            .http
            .patch(self.rest_url("profiles"))
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=minimal")
            .json(update);
        let response = self.authorize(request).await?.send().await?;
        check(response).await?;
        Ok(())
    }

    async fn fetch_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, BackendError> {
        self.select_single("subscriptions", "user_id", user_id).await
    }

    async fn fetch_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserPreferences>, BackendError> {
        self.select_single("user_preferences", "user_id", user_id)
            .await
    }

    async fn invoke_function(&self, name: &str, body: Value) -> Result<Value, BackendError> {
        let request = self.http.post(self.function_url(name)).json(&body);
        let response = self.authorize(request).await?.send().await?;
        let text = check(response).await?.text().await?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
