//! Backend client: the single seam between the session store and the hosted backend.
//!
//! `SessionStore` and `BillingService` hold an `Arc<dyn BackendClient>`; nothing
//! else talks to the backend directly. `SupabaseClient` is the HTTPS implementation.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::models::{
    AuthEvent, AuthSession, AuthUser, NewProfile, Profile, ProfileUpdate, SignUpOutcome,
    Subscription, UserPreferences,
};

#[cfg(test)]
pub(crate) mod memory;
pub mod supabase;

pub use supabase::SupabaseClient;

#[async_trait]
pub trait BackendClient: Send + Sync {
    // ── auth ────────────────────────────────────────────────────────────────

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, BackendError>;

    /// Invalidates the current session. Local credentials are dropped even
    /// when the remote call fails.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The user behind the current session, or `None` when signed out.
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError>;

    async fn reset_password_for_email(&self, email: &str) -> Result<(), BackendError>;

    async fn update_auth_email(&self, email: &str) -> Result<AuthUser, BackendError>;

    async fn update_password(&self, password: &str) -> Result<(), BackendError>;

    /// Removes an auth identity. Used only to undo a half-finished sign-up.
    async fn delete_identity(&self, user_id: Uuid) -> Result<(), BackendError>;

    // ── tables ──────────────────────────────────────────────────────────────

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError>;

    async fn upsert_profile(&self, profile: &NewProfile) -> Result<(), BackendError>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<(), BackendError>;

    async fn fetch_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, BackendError>;

    async fn fetch_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserPreferences>, BackendError>;

    // ── functions ───────────────────────────────────────────────────────────

    async fn invoke_function(&self, name: &str, body: Value) -> Result<Value, BackendError>;

    // ── events ──────────────────────────────────────────────────────────────

    /// A fresh receiver for auth state changes (sign-in, sign-out, token refresh...).
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}
