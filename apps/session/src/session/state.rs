use chrono::{DateTime, Utc};

use crate::access::{self, AccessSummary};
use crate::errors::SessionError;
use crate::models::{Profile, Subscription, UserPreferences};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

/// In-memory snapshot of who is signed in. Replaced wholesale by `load_user`.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user: Option<Profile>,
    pub subscription: Option<Subscription>,
    pub preferences: Option<UserPreferences>,
    pub loading: bool,
    /// Set once the first `load_user` (or sign-out) has finished.
    pub initialized: bool,
    pub last_error: Option<SessionError>,
}

impl SessionState {
    pub(crate) fn anonymous() -> Self {
        Self {
            initialized: true,
            ..Self::default()
        }
    }

    pub(crate) fn authenticated(
        user: Profile,
        subscription: Option<Subscription>,
        preferences: Option<UserPreferences>,
    ) -> Self {
        Self {
            user: Some(user),
            subscription,
            preferences,
            loading: false,
            initialized: true,
            last_error: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.loading {
            SessionPhase::Loading
        } else if !self.initialized {
            SessionPhase::Uninitialized
        } else if self.user.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn access(&self, now: DateTime<Utc>) -> AccessSummary {
        access::summarize(self.user.as_ref(), self.subscription.as_ref(), now)
    }
}
