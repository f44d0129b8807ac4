use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::ObserverInboundMessage,
    services::{
        broadcast::{self, SendError},
        timer_service,
    },
    state::{ObserverConnection, SharedState},
};

/// Handle the full lifecycle of an observer WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let id = Uuid::new_v4();

    // Registering and sending the first snapshot under the engine lock guarantees no
    // broadcast can overtake it.
    {
        let engine = state.engine().lock().await;
        state.observers().insert(
            id,
            ObserverConnection {
                id,
                tx: outbound_tx.clone(),
            },
        );
        if broadcast::send_snapshot(&outbound_tx, engine.state()).is_err() {
            drop(engine);
            state.observers().remove(&id);
            finalize(writer_task, outbound_tx).await;
            return;
        }
    }
    info!(%id, "observer connected");

    let mut shutdown = state.shutdown_watcher();
    loop {
        let message = tokio::select! {
            _ = shutdown.wait_for(|closing| *closing) => {
                let _ = outbound_tx.send(Message::Close(None));
                break;
            }
            message = receiver.next() => match message {
                Some(message) => message,
                None => break,
            },
        };
        match message {
            Ok(Message::Text(text)) => {
                debug!(%id, payload = %text, "received observer message");
                match ObserverInboundMessage::from_json_str(&text) {
                    Ok(inbound) => {
                        if let Err(SendError::ConnectionClosed) =
                            dispatch(&state, &outbound_tx, inbound).await
                        {
                            break;
                        }
                    }
                    Err(err) => warn!(%id, error = %err, "ignoring malformed observer message"),
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.observers().remove(&id);
    info!(%id, "observer disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Execute one observer message. Commands that change nothing answer the sender alone with
/// the current snapshot so its display can resynchronize.
async fn dispatch(
    state: &SharedState,
    tx: &mpsc::UnboundedSender<Message>,
    message: ObserverInboundMessage,
) -> Result<(), SendError> {
    let committed = match message {
        ObserverInboundMessage::TimerControl(payload) => {
            timer_service::handle_control(state, &payload).await
        }
        ObserverInboundMessage::SettingsUpdate(payload) => {
            timer_service::update_setting(state, payload.key.as_deref(), &payload.value).await
        }
        ObserverInboundMessage::ManualAdjust(payload) => {
            Some(timer_service::manual_adjust(state, &payload).await)
        }
        ObserverInboundMessage::RequestState => None,
        ObserverInboundMessage::Unknown(event) => {
            debug!(event = %event, "ignoring unknown observer event");
            None
        }
    };

    if committed.is_some() {
        return Ok(());
    }
    let engine = state.engine().lock().await;
    match broadcast::send_snapshot(tx, engine.state()) {
        Err(SendError::Encode(err)) => {
            warn!(error = %err, "failed to serialize snapshot for observer");
            Ok(())
        }
        other => other,
    }
}

/// Drop the outbound channel and wait for the writer task to drain.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
