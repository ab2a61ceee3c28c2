//! Signaling Relay
//!
//! Forwards peer-connection setup messages (offer, answer, ICE candidate)
//! between two connections of the same session. Payloads are relayed
//! verbatim. Nothing is queued: a message for a target that is not
//! currently joined is dropped and that link attempt simply fails.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::canvas::state::ConnectionId;
use crate::network::protocol::{SignalForward, SignalKind};
use crate::network::registry::{SessionId, SessionRegistry};

/// Stateless relay over the session registry.
#[derive(Clone)]
pub struct SignalingRelay {
    registry: Arc<SessionRegistry>,
}

impl SignalingRelay {
    /// Create a relay reading membership from `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `payload` to `target`, tagged with `sender`.
    ///
    /// Returns `true` if the message was enqueued for the target.
    pub fn forward(
        &self,
        session_id: &SessionId,
        kind: SignalKind,
        sender: ConnectionId,
        target: ConnectionId,
        payload: Value,
    ) -> bool {
        let Some(session) = self.registry.get(session_id) else {
            return false;
        };

        let message = kind.into_message(SignalForward {
            session_id: session_id.to_string(),
            sender_id: sender,
            payload,
        });

        let delivered = session.lock().send_to(&target, message);
        if !delivered {
            trace!("Dropped {:?} from {} to absent target {}", kind, sender, target);
        }
        delivered
    }

    /// Connections joined to the session other than `excluding`.
    pub fn list_peers(&self, session_id: &SessionId, excluding: &ConnectionId) -> Vec<ConnectionId> {
        self.registry
            .get(session_id)
            .map(|session| session.lock().peers(excluding))
            .unwrap_or_default()
    }
}
