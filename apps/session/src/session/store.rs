//! Session store: owns the signed-in user's profile and subscription snapshot.
//!
//! One instance per client, constructed with its backend. Observers follow
//! changes through `subscribe()`; every mutation replaces or edits the state
//! inside the watch channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::access::trial_period;
use crate::backend::BackendClient;
use crate::errors::SessionError;
use crate::models::{NewProfile, ProfileUpdate, UserType};
use crate::password::is_strong_password;
use crate::session::listener::AuthChangeListener;
use crate::session::state::{SessionPhase, SessionState};

pub struct SessionStore {
    backend: Arc<dyn BackendClient>,
    state: watch::Sender<SessionState>,
    /// Sequence number of the most recent `load_user` or sign-out.
    /// Older `load_user` responses are dropped on arrival.
    latest_request: AtomicU64,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            state,
            latest_request: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<dyn BackendClient> {
        &self.backend
    }

    /// A copy of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Starts reloading the user on every backend auth event.
    pub fn listen(self: &Arc<Self>) -> AuthChangeListener {
        AuthChangeListener::spawn(Arc::clone(self), self.backend.auth_events())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.set_loading();

        if let Err(e) = self.backend.sign_in_with_password(email, password).await {
            error!("Error signing in: {e}");
            return Err(self.fail(e.into()));
        }

        self.load_user().await
    }

    /// Creates the auth identity, then its profile row. If the profile write
    /// fails the identity is deleted again so no account is left without a profile.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        user_type: Option<UserType>,
    ) -> Result<(), SessionError> {
        if !is_strong_password(password) {
            return Err(self.fail(SessionError::WeakPassword));
        }
        self.set_loading();

        let outcome = match self.backend.sign_up(email, password, full_name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error signing up: {e}");
                return Err(self.fail(e.into()));
            }
        };
        if outcome.is_existing_account() {
            warn!("Sign-up attempted for an already registered email");
            return Err(self.fail(SessionError::EmailInUse));
        }

        let user_id = outcome.user.id;
        let full_name = full_name.trim();
        let profile = NewProfile {
            id: user_id,
            email: outcome.user.email.clone().unwrap_or_else(|| email.to_string()),
            full_name: (!full_name.is_empty()).then(|| full_name.to_string()),
            user_type: user_type.unwrap_or_default(),
            trial_ends_at: Utc::now() + trial_period(),
        };

        if let Err(e) = self.backend.upsert_profile(&profile).await {
            error!("Error creating profile for {user_id}: {e}");
            match self.backend.delete_identity(user_id).await {
                Ok(()) => warn!("Deleted identity {user_id} after failed profile creation"),
                Err(cleanup) => {
                    error!("Identity {user_id} left without a profile, cleanup failed: {cleanup}")
                }
            }
            return Err(self.fail(e.into()));
        }

        info!(
            "Created account {user_id} ({})",
            profile.user_type.as_str()
        );

        // Auto-confirmed sign-ups come back signed in; a reload triggered by
        // that sign-in may have run before the profile row existed.
        if outcome.session.is_some() {
            return self.load_user().await;
        }
        self.state.send_modify(|s| s.loading = false);
        Ok(())
    }

    /// Clears the in-memory session whether or not the backend call succeeds.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        // In-flight loads must not resurrect the signed-out user.
        self.next_request();
        let result = self.backend.sign_out().await;

        let mut cleared = SessionState::anonymous();
        if let Err(e) = &result {
            error!("Error signing out: {e}");
            cleared.last_error = Some(e.clone().into());
        }
        self.state.send_replace(cleared);

        result.map_err(Into::into)
    }

    /// Re-reads the session, profile, subscription and preferences and replaces
    /// the state with the result. A missing subscription or preference row is
    /// a normal empty case; a missing profile is not.
    pub async fn load_user(&self) -> Result<(), SessionError> {
        let request = self.next_request();
        self.set_loading();

        let result = self.fetch_state().await;
        if !self.is_latest(request) {
            debug!("Discarding stale user load #{request}");
            return result.map(|_| ());
        }

        match result {
            Ok(state) => {
                debug!(
                    "User load #{request} applied (authenticated: {})",
                    state.is_authenticated()
                );
                self.state.send_replace(state);
                Ok(())
            }
            Err(e) => {
                error!("Error loading user: {e}");
                let failed = SessionState {
                    last_error: Some(e.clone()),
                    ..SessionState::anonymous()
                };
                self.state.send_replace(failed);
                Err(e)
            }
        }
    }

    /// Sends the password-reset email. Session state is left untouched.
    pub async fn reset_password(&self, email: &str) -> Result<(), SessionError> {
        if let Err(e) = self.backend.reset_password_for_email(email).await {
            error!("Error requesting password reset: {e}");
            return Err(e.into());
        }
        info!("Password reset email requested");
        Ok(())
    }

    /// Updates the auth email first when it changes, then the profile row,
    /// then reloads.
    pub async fn update_profile(&self, updates: ProfileUpdate) -> Result<(), SessionError> {
        let current = self.state.borrow().user.as_ref().map(|p| p.id);
        let Some(user_id) = current else {
            return Err(self.fail(SessionError::NotAuthenticated));
        };
        self.set_loading();

        if let Some(email) = &updates.email {
            if let Err(e) = self.backend.update_auth_email(email).await {
                error!("Error updating auth email: {e}");
                return Err(self.fail(e.into()));
            }
        }

        if !updates.is_empty() {
            if let Err(e) = self.backend.update_profile(user_id, &updates).await {
                error!("Error updating profile: {e}");
                return Err(self.fail(e.into()));
            }
        }

        self.load_user().await
    }

    pub async fn update_password(&self, password: &str) -> Result<(), SessionError> {
        if !is_strong_password(password) {
            return Err(self.fail(SessionError::WeakPassword));
        }
        if let Err(e) = self.backend.update_password(password).await {
            error!("Error updating password: {e}");
            return Err(self.fail(e.into()));
        }
        info!("Password updated");
        Ok(())
    }

    async fn fetch_state(&self) -> Result<SessionState, SessionError> {
        let Some(auth_user) = self.backend.current_user().await? else {
            return Ok(SessionState::anonymous());
        };
        let user_id = auth_user.id;

        let profile = self
            .backend
            .fetch_profile(user_id)
            .await?
            .ok_or(SessionError::MissingProfile(user_id))?;

        let subscription = self.backend.fetch_subscription(user_id).await?;

        let preferences = match self.backend.fetch_preferences(user_id).await {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!("Error fetching preferences for {user_id}: {e}");
                None
            }
        };

        Ok(SessionState::authenticated(profile, subscription, preferences))
    }

    fn next_request(&self) -> u64 {
        self.latest_request.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, request: u64) -> bool {
        self.latest_request.load(Ordering::SeqCst) == request
    }

    fn set_loading(&self) {
        self.state.send_modify(|s| s.loading = true);
    }

    /// Records a failure next to the current state and hands the error back.
    fn fail(&self, err: SessionError) -> SessionError {
        self.state.send_modify(|s| {
            s.loading = false;
            s.last_error = Some(err.clone());
        });
        err
    }
}
