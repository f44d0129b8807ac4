//! Streamlabs alert socket client.
//!
//! Streamlabs speaks Socket.IO over Engine.IO v3. Only the small subset the timer needs is
//! implemented: the open handshake, heartbeats and `event` messages on the root namespace.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::StreamlabsConfig, dto::provider::RawProviderEvent, services::timer_service,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);
const ALERT_EVENT: &str = "event";
const PING_FRAME: &str = "2";
const PONG_FRAME: &str = "3";

/// Failure of one socket session.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configured socket address is not a URL.
    #[error("invalid provider socket url")]
    InvalidUrl(#[from] url::ParseError),
    /// The socket could not be opened.
    #[error("failed to connect to provider socket")]
    Connect(#[source] tungstenite::Error),
    /// The socket failed after it was established.
    #[error("provider socket error")]
    Socket(#[from] tungstenite::Error),
}

/// Decoded Engine.IO / Socket.IO text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineFrame {
    /// Engine.IO handshake carrying the heartbeat interval.
    Open { ping_interval: Duration },
    /// Engine.IO close.
    Close,
    /// Heartbeat probe.
    Ping,
    /// Heartbeat answer.
    Pong,
    /// Socket.IO namespace connected.
    Connected,
    /// Socket.IO namespace disconnected.
    Disconnected,
    /// Socket.IO event with its first argument.
    Event { name: String, payload: Value },
    /// Anything else.
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    #[serde(default)]
    ping_interval: Option<u64>,
}

/// Parse one text frame.
pub fn parse_frame(text: &str) -> EngineFrame {
    let mut chars = text.chars();
    match chars.next() {
        Some('0') => {
            let ping_interval = serde_json::from_str::<Handshake>(chars.as_str())
                .ok()
                .and_then(|handshake| handshake.ping_interval)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PING_INTERVAL);
            EngineFrame::Open { ping_interval }
        }
        Some('1') => EngineFrame::Close,
        Some('2') => EngineFrame::Ping,
        Some('3') => EngineFrame::Pong,
        Some('4') => parse_packet(chars.as_str()),
        _ => EngineFrame::Other,
    }
}

fn parse_packet(packet: &str) -> EngineFrame {
    let mut chars = packet.chars();
    match chars.next() {
        Some('0') => EngineFrame::Connected,
        Some('1') => EngineFrame::Disconnected,
        Some('2') => parse_event(chars.as_str()),
        _ => EngineFrame::Other,
    }
}

fn parse_event(body: &str) -> EngineFrame {
    // Optional `/namespace,` prefix, then an optional ack id.
    let body = match body.strip_prefix('/') {
        Some(rest) => rest.split_once(',').map_or("", |(_, args)| args),
        None => body,
    };
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    let Ok(Value::Array(mut args)) = serde_json::from_str::<Value>(body) else {
        return EngineFrame::Other;
    };
    if args.is_empty() {
        return EngineFrame::Other;
    }
    let Value::String(name) = args.remove(0) else {
        return EngineFrame::Other;
    };
    let payload = if args.is_empty() {
        Value::Null
    } else {
        args.remove(0)
    };
    EngineFrame::Event { name, payload }
}

fn socket_url(config: &StreamlabsConfig) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&config.url)?;
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("token", &config.token)
        .append_pair("EIO", "3")
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Keep a connection to the alert socket open, reconnecting with exponential backoff.
pub async fn run(state: SharedState, config: StreamlabsConfig) {
    let mut delay = INITIAL_DELAY;

    loop {
        match session(&state, &config).await {
            Ok(()) => {
                info!("provider socket closed; reconnecting");
                delay = INITIAL_DELAY;
            }
            Err(err @ (ProviderError::Connect(_) | ProviderError::InvalidUrl(_))) => {
                warn!(error = ?err, "provider connection attempt failed");
            }
            Err(err) => {
                warn!(error = ?err, "provider socket failed; reconnecting");
                delay = INITIAL_DELAY;
            }
        }
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

async fn session(state: &SharedState, config: &StreamlabsConfig) -> Result<(), ProviderError> {
    let url = socket_url(config)?;
    let (socket, _response) = connect_async(url.as_str())
        .await
        .map_err(ProviderError::Connect)?;
    info!(url = %config.url, "connected to provider socket");
    let (mut sink, mut stream) = socket.split();

    let mut heartbeat = interval(DEFAULT_PING_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                sink.send(Message::Text(PING_FRAME.into())).await?;
            }
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                match frame? {
                    Message::Text(text) => match parse_frame(text.as_str()) {
                        EngineFrame::Open { ping_interval } => {
                            debug!(?ping_interval, "provider handshake");
                            heartbeat = interval(ping_interval);
                            heartbeat.tick().await;
                        }
                        EngineFrame::Ping => sink.send(Message::Text(PONG_FRAME.into())).await?,
                        EngineFrame::Connected => info!("subscribed to provider alerts"),
                        EngineFrame::Event { name, payload } if name == ALERT_EVENT => {
                            handle_alert(state, payload).await;
                        }
                        EngineFrame::Close | EngineFrame::Disconnected => return Ok(()),
                        EngineFrame::Event { .. } | EngineFrame::Pong | EngineFrame::Other => {}
                    },
                    Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
                    Message::Close(frame) => {
                        debug!(?frame, "provider closed the socket");
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn handle_alert(state: &SharedState, payload: Value) {
    match serde_json::from_value::<RawProviderEvent>(payload) {
        Ok(event) => {
            timer_service::ingest_provider_event(state, &event).await;
        }
        Err(err) => debug!(error = %err, "ignoring undecodable provider alert"),
    }
}
