//! Session and subscription state for the JobNex client.
//!
//! `SessionStore` is the entry point: construct it with a `BackendClient`
//! (usually `SupabaseClient`), call `listen()` once to follow backend auth
//! events, and read state through `state()` or `subscribe()`.

pub mod access;
pub mod backend;
pub mod billing;
pub mod config;
pub mod errors;
pub mod models;
pub mod password;
pub mod session;

pub use backend::{BackendClient, SupabaseClient};
pub use billing::BillingService;
pub use config::Config;
pub use errors::{BackendError, ErrorKind, SessionError};
pub use session::{AuthChangeListener, SessionPhase, SessionState, SessionStore};
