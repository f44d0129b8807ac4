use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{sse::ServerEvent, timer::TimerSnapshot, ws::EVENT_TIMER_UPDATE},
    state::SharedState,
};

/// Subscribe to the timer stream, returning the current snapshot as the first event.
///
/// Both are taken under the engine lock so the stream starts exactly at the snapshot.
pub async fn subscribe_timer(
    state: &SharedState,
) -> (Option<ServerEvent>, broadcast::Receiver<ServerEvent>) {
    let engine = state.engine().lock().await;
    let receiver = state.timer_sse().subscribe();
    let initial = match ServerEvent::json(
        Some(EVENT_TIMER_UPDATE.to_string()),
        &TimerSnapshot::from(engine.state()),
    ) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to serialize initial SSE snapshot");
            None
        }
    };
    (initial, receiver)
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Forward the initial snapshot then every broadcast event until the client disconnects or
/// the server begins shutting down.
pub fn event_stream(
    initial: Option<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> ReceiverStream<Result<Event, Infallible>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(initial) = initial {
            if tx.send(Ok(to_event(initial))).await.is_err() {
                return;
            }
        }
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = async { let _ = shutdown.wait_for(|closing| *closing).await; } => {
                    info!("ending timer SSE stream for shutdown");
                    break;
                }
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // Only the newest snapshot matters; skip what was missed.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
        info!("timer SSE stream disconnected");
    });

    ReceiverStream::new(rx)
}

/// Wrap [`event_stream`] into an SSE response with keep-alive comments.
pub fn to_sse_stream(
    initial: Option<ServerEvent>,
    receiver: broadcast::Receiver<ServerEvent>,
    shutdown: watch::Receiver<bool>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(event_stream(initial, receiver, shutdown)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
