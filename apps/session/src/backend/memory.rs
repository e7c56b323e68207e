//! In-memory `BackendClient` for store and listener tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::errors::{BackendError, ErrorKind};
use crate::models::{
    AuthEvent, AuthSession, AuthUser, Identity, NewProfile, Profile, ProfileUpdate,
    SignUpOutcome, Subscription, UserPreferences,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, (AuthUser, String)>,
    signed_in: Option<Uuid>,
    profiles: HashMap<Uuid, Profile>,
    subscriptions: HashMap<Uuid, Subscription>,
    preferences: HashMap<Uuid, UserPreferences>,
    calls: Vec<String>,
    profile_delays: VecDeque<Duration>,
    upsert_delays: VecDeque<Duration>,
    fail_upsert: Option<BackendError>,
    fail_sign_out: Option<BackendError>,
    fail_subscription: Option<BackendError>,
    fail_preferences: Option<BackendError>,
    fail_delete: Option<BackendError>,
    function_responses: HashMap<String, Value>,
}

pub(crate) struct InMemoryBackend {
    inner: Mutex<Inner>,
    events: broadcast::Sender<AuthEvent>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    fn record(&self, call: &str) {
        self.with(|i| i.calls.push(call.to_string()));
    }

    /// Registers an account with a profile row and returns its id.
    pub fn add_account(&self, email: &str, password: &str, full_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let user = auth_user(id, email);
        let now = Utc::now();
        self.with(|i| {
            i.accounts
                .insert(email.to_string(), (user, password.to_string()));
            i.profiles.insert(
                id,
                Profile {
                    id,
                    email: email.to_string(),
                    full_name: Some(full_name.to_string()),
                    user_type: None,
                    is_admin: Some(false),
                    trial_ends_at: None,
                    has_used_trial: None,
                    title: None,
                    phone: None,
                    location: None,
                    linkedin: None,
                    website: None,
                    created_at: Some(now),
                    updated_at: Some(now),
                },
            );
        });
        id
    }

    pub fn sign_in_as(&self, id: Uuid) {
        self.with(|i| i.signed_in = Some(id));
    }

    pub fn remove_profile(&self, id: Uuid) {
        self.with(|i| i.profiles.remove(&id));
    }

    pub fn set_full_name(&self, id: Uuid, name: &str) {
        self.with(|i| {
            if let Some(p) = i.profiles.get_mut(&id) {
                p.full_name = Some(name.to_string());
            }
        });
    }

    pub fn set_subscription(&self, subscription: Subscription) {
        self.with(|i| i.subscriptions.insert(subscription.user_id, subscription));
    }

    pub fn set_preferences(&self, preferences: UserPreferences) {
        self.with(|i| i.preferences.insert(preferences.user_id, preferences));
    }

    pub fn push_profile_delay(&self, delay: Duration) {
        self.with(|i| i.profile_delays.push_back(delay));
    }

    pub fn push_upsert_delay(&self, delay: Duration) {
        self.with(|i| i.upsert_delays.push_back(delay));
    }

    pub fn fail_upsert(&self, err: BackendError) {
        self.with(|i| i.fail_upsert = Some(err));
    }

    pub fn fail_sign_out(&self, err: BackendError) {
        self.with(|i| i.fail_sign_out = Some(err));
    }

    pub fn fail_subscription(&self, err: BackendError) {
        self.with(|i| i.fail_subscription = Some(err));
    }

    pub fn fail_preferences(&self, err: BackendError) {
        self.with(|i| i.fail_preferences = Some(err));
    }

    pub fn fail_delete(&self, err: BackendError) {
        self.with(|i| i.fail_delete = Some(err));
    }

    pub fn respond_to_function(&self, name: &str, response: Value) {
        self.with(|i| i.function_responses.insert(name.to_string(), response));
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.with(|i| i.accounts.contains_key(email))
    }

    pub fn auth_email(&self, id: Uuid) -> Option<String> {
        self.with(|i| {
            i.accounts
                .values()
                .find(|(u, _)| u.id == id)
                .and_then(|(u, _)| u.email.clone())
        })
    }

    pub fn password_of(&self, email: &str) -> Option<String> {
        self.with(|i| i.accounts.get(email).map(|(_, p)| p.clone()))
    }

    pub fn calls(&self, name: &str) -> usize {
        self.with(|i| i.calls.iter().filter(|c| c.as_str() == name).count())
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

fn auth_user(id: Uuid, email: &str) -> AuthUser {
    AuthUser {
        id,
        email: Some(email.to_string()),
        identities: Some(vec![Identity {
            id: id.to_string(),
            provider: "email".to_string(),
        }]),
        email_confirmed_at: Some(Utc::now()),
        user_metadata: Value::Null,
    }
}

fn session_for(user: AuthUser) -> AuthSession {
    AuthSession {
        access_token: format!("access-{}", user.id),
        refresh_token: format!("refresh-{}", user.id),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user,
    }
}

fn rejected() -> BackendError {
    BackendError::new(ErrorKind::CredentialRejected, "Auth session missing!").with_status(401)
}

#[async_trait]
impl BackendClient for InMemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        self.record("sign_in");
        let user = self.with(|i| match i.accounts.get(email) {
            Some((user, stored)) if stored == password => {
                i.signed_in = Some(user.id);
                Ok(user.clone())
            }
            _ => Err(BackendError::from_response(
                400,
                Some("invalid_credentials".to_string()),
                "Invalid login credentials".to_string(),
            )),
        })?;
        self.emit(AuthEvent::SignedIn);
        Ok(session_for(user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _full_name: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        self.record("sign_up");
        let outcome = self.with(|i| {
            if let Some((existing, _)) = i.accounts.get(email) {
                let mut user = existing.clone();
                user.identities = Some(vec![]);
                return SignUpOutcome {
                    user,
                    session: None,
                };
            }
            let user = auth_user(Uuid::new_v4(), email);
            i.accounts
                .insert(email.to_string(), (user.clone(), password.to_string()));
            i.signed_in = Some(user.id);
            SignUpOutcome {
                session: Some(session_for(user.clone())),
                user,
            }
        });
        if outcome.session.is_some() {
            self.emit(AuthEvent::SignedIn);
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.record("sign_out");
        let failure = self.with(|i| {
            i.signed_in = None;
            i.fail_sign_out.clone()
        });
        self.emit(AuthEvent::SignedOut);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        self.record("current_user");
        Ok(self.with(|i| {
            let id = i.signed_in?;
            i.accounts
                .values()
                .find(|(u, _)| u.id == id)
                .map(|(u, _)| u.clone())
        }))
    }

    async fn reset_password_for_email(&self, _email: &str) -> Result<(), BackendError> {
        self.record("reset_password");
        Ok(())
    }

    async fn update_auth_email(&self, email: &str) -> Result<AuthUser, BackendError> {
        self.record("update_auth_email");
        let user = self.with(|i| {
            let id = i.signed_in.ok_or_else(rejected)?;
            let old_key = i
                .accounts
                .iter()
                .find(|(_, (u, _))| u.id == id)
                .map(|(k, _)| k.clone())
                .ok_or_else(rejected)?;
            let (mut user, password) = i.accounts.remove(&old_key).ok_or_else(rejected)?;
            user.email = Some(email.to_string());
            i.accounts
                .insert(email.to_string(), (user.clone(), password));
            Ok::<_, BackendError>(user)
        })?;
        self.emit(AuthEvent::UserUpdated);
        Ok(user)
    }

    async fn update_password(&self, password: &str) -> Result<(), BackendError> {
        self.record("update_password");
        self.with(|i| {
            let id = i.signed_in.ok_or_else(rejected)?;
            let entry = i
                .accounts
                .values_mut()
                .find(|(u, _)| u.id == id)
                .ok_or_else(rejected)?;
            entry.1 = password.to_string();
            Ok::<_, BackendError>(())
        })?;
        self.emit(AuthEvent::UserUpdated);
        Ok(())
    }

    async fn delete_identity(&self, user_id: Uuid) -> Result<(), BackendError> {
        self.record("delete_identity");
        self.with(|i| {
            if let Some(err) = i.fail_delete.clone() {
                return Err(err);
            }
            i.accounts.retain(|_, (u, _)| u.id != user_id);
            if i.signed_in == Some(user_id) {
                i.signed_in = None;
            }
            Ok(())
        })
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        self.record("fetch_profile");
        let (profile, delay) = self.with(|i| {
            (
                i.profiles.get(&user_id).cloned(),
                i.profile_delays.pop_front(),
            )
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(profile)
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> Result<(), BackendError> {
        self.record("upsert_profile");
        let delay = self.with(|i| i.upsert_delays.pop_front());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with(|i| {
            if let Some(err) = i.fail_upsert.clone() {
                return Err(err);
            }
            let now = Utc::now();
            i.profiles.insert(
                profile.id,
                Profile {
                    id: profile.id,
                    email: profile.email.clone(),
                    full_name: profile.full_name.clone(),
                    user_type: Some(profile.user_type),
                    is_admin: Some(false),
                    trial_ends_at: Some(profile.trial_ends_at),
                    has_used_trial: None,
                    title: None,
                    phone: None,
                    location: None,
                    linkedin: None,
                    website: None,
                    created_at: Some(now),
                    updated_at: Some(now),
                },
            );
            Ok(())
        })
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<(), BackendError> {
        self.record("update_profile");
        self.with(|i| {
            if let Some(profile) = i.profiles.get_mut(&user_id) {
                update.apply_to(profile);
                profile.updated_at = Some(Utc::now());
            }
        });
        Ok(())
    }

    async fn fetch_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, BackendError> {
        self.record("fetch_subscription");
        self.with(|i| match i.fail_subscription.clone() {
            Some(err) => Err(err),
            None => Ok(i.subscriptions.get(&user_id).cloned()),
        })
    }

    async fn fetch_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserPreferences>, BackendError> {
        self.record("fetch_preferences");
        self.with(|i| match i.fail_preferences.clone() {
            Some(err) => Err(err),
            None => Ok(i.preferences.get(&user_id).cloned()),
        })
    }

    async fn invoke_function(&self, name: &str, _body: Value) -> Result<Value, BackendError> {
        self.record(name);
        self.with(|i| {
            i.function_responses.get(name).cloned().ok_or_else(|| {
                BackendError::from_response(404, None, format!("Function {name} not found"))
            })
        })
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
