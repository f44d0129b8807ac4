use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::{
        sse::ServerEvent,
        timer::TimerSnapshot,
        ws::{EVENT_TIMER_UPDATE, ObserverOutboundMessage},
    },
    state::{SharedState, timer::TimerState},
};

/// Failure to hand a message to an observer's writer task.
#[derive(Debug, Error)]
pub enum SendError {
    /// Writer channel closed; the observer is gone.
    #[error("connection closed")]
    ConnectionClosed,
    /// The payload could not be encoded.
    #[error("failed to encode snapshot")]
    Encode(#[from] serde_json::Error),
}

/// Push `state` to every observer socket and to the SSE stream.
///
/// Must be called while the engine lock is held so snapshots leave in version order.
pub fn publish_snapshot(state: &SharedState, snapshot: &TimerState) {
    let dto = TimerSnapshot::from(snapshot);
    let payload = match serde_json::to_string(&ObserverOutboundMessage::timer_update(&dto)) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize timer snapshot");
            return;
        }
    };

    let mut closed = Vec::new();
    for entry in state.observers().iter() {
        if entry
            .tx
            .send(Message::Text(payload.clone().into()))
            .is_err()
        {
            closed.push(entry.id);
        }
    }
    for id in closed {
        debug!(%id, "dropping observer with closed writer");
        state.observers().remove(&id);
    }

    match ServerEvent::json(Some(EVENT_TIMER_UPDATE.to_string()), &dto) {
        Ok(event) => state.timer_sse().broadcast(event),
        Err(err) => warn!(error = %err, "failed to serialize SSE snapshot"),
    }
}

/// Send `snapshot` to a single observer.
pub fn send_snapshot(
    tx: &mpsc::UnboundedSender<Message>,
    snapshot: &TimerState,
) -> Result<(), SendError> {
    let dto = TimerSnapshot::from(snapshot);
    let payload = serde_json::to_string(&ObserverOutboundMessage::timer_update(&dto))?;
    tx.send(Message::Text(payload.into()))
        .map_err(|_| SendError::ConnectionClosed)
}
