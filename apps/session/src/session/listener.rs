use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::AuthEvent;
use crate::session::store::SessionStore;

/// Background task that reloads the user on every backend auth event.
///
/// Events are not filtered or debounced: a burst of events produces the same
/// number of reloads. The task stops when the event channel closes or the
/// listener is dropped.
pub struct AuthChangeListener {
    handle: JoinHandle<()>,
}

impl AuthChangeListener {
    pub fn spawn(store: Arc<SessionStore>, mut events: broadcast::Receiver<AuthEvent>) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(?event, "Auth state changed, reloading user");
                        if let Err(e) = store.load_user().await {
                            warn!("Reload after {event:?} failed: {e}");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Auth listener lagged behind by {skipped} events, reloading once");
                        if let Err(e) = store.load_user().await {
                            warn!("Reload after lag failed: {e}");
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Auth event channel closed, listener exiting");
                        break;
                    }
                }
            }
        });

        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for AuthChangeListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
