//! Premium-access rules derived from the profile's trial window and the
//! subscription status.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{Plan, Profile, Subscription};

/// Length of the free trial granted at sign-up.
pub const TRIAL_PERIOD_HOURS: i64 = 24;

pub fn trial_period() -> Duration {
    Duration::hours(TRIAL_PERIOD_HOURS)
}

pub fn is_trial_active(profile: &Profile, now: DateTime<Utc>) -> bool {
    profile.trial_ends_at.is_some_and(|ends| ends > now)
}

/// Time left in the trial, `None` once it has ended.
pub fn trial_remaining(profile: &Profile, now: DateTime<Utc>) -> Option<Duration> {
    profile
        .trial_ends_at
        .filter(|ends| *ends > now)
        .map(|ends| ends - now)
}

pub fn has_premium_access(
    profile: Option<&Profile>,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
) -> bool {
    let trial = profile.is_some_and(|p| is_trial_active(p, now));
    let paid = subscription.is_some_and(|s| s.status.grants_access());
    trial || paid
}

/// The billing portal needs a customer on the payment processor side.
pub fn can_manage_billing(subscription: Option<&Subscription>) -> bool {
    subscription.is_some_and(|s| s.stripe_customer_id.is_some())
}

/// Summary shown next to the account menu.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessSummary {
    pub plan: Plan,
    pub status: Option<&'static str>,
    pub trial_active: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub premium: bool,
    pub can_manage_billing: bool,
}

pub fn summarize(
    profile: Option<&Profile>,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
) -> AccessSummary {
    let trial_active = profile.is_some_and(|p| is_trial_active(p, now));
    AccessSummary {
        plan: subscription.map(|s| s.plan).unwrap_or_default(),
        status: subscription.map(|s| s.status.label()),
        trial_active,
        trial_ends_at: profile
            .and_then(|p| p.trial_ends_at)
            .filter(|_| trial_active),
        premium: has_premium_access(profile, subscription, now),
        can_manage_billing: can_manage_billing(subscription),
    }
}
