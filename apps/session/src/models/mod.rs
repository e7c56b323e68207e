pub mod auth;
pub mod preferences;
pub mod profile;
pub mod subscription;

pub use auth::{AuthEvent, AuthSession, AuthUser, Identity, SignUpOutcome};
pub use preferences::UserPreferences;
pub use profile::{NewProfile, Profile, ProfileUpdate, UserType};
pub use subscription::{Plan, Subscription, SubscriptionStatus};
