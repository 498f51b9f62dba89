use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use shared_models::auth::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn,
    SignedUp,
    SignedOut,
    UserUpdated,
}

/// Process-wide session change channel. Every sign-in, sign-up, sign-out and
/// metadata update is published as `(event, session)`.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<(AuthEvent, Option<Session>)>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: AuthEvent, session: Option<Session>) {
        if self.sender.send((event, session)).is_err() {
            debug!("Session event {:?} dropped, no subscribers", event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(AuthEvent, Option<Session>)> {
        self.sender.subscribe()
    }
}
