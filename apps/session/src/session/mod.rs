pub mod listener;
pub mod state;
pub mod store;

pub use listener::AuthChangeListener;
pub use state::{SessionPhase, SessionState};
pub use store::SessionStore;
