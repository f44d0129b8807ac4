use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    dto::timer::TimerSnapshot,
    sanitize,
    state::{engine::TimerControl, timer::Adjustment},
};

/// Name of the outbound snapshot message.
pub const EVENT_TIMER_UPDATE: &str = "timer-update";

const DEFAULT_MANUAL_REASON: &str = "manual";

/// Wire envelope shared by every observer message: `{ "event": ..., "data": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Messages accepted from observer WebSocket clients.
#[derive(Debug, Clone)]
pub enum ObserverInboundMessage {
    /// Start, pause, reset, set the time or toggle happy hour.
    TimerControl(TimerControlPayload),
    /// Change the seconds configured for one category.
    SettingsUpdate(SettingsUpdatePayload),
    /// Apply an adjustment by hand, bypassing ingestion.
    ManualAdjust(ManualAdjustPayload),
    /// Ask for the current snapshot.
    RequestState,
    /// Any other event name.
    Unknown(String),
}

impl ObserverInboundMessage {
    /// Parse a text frame. Only a frame that is not an envelope at all is an error; payloads
    /// of the wrong shape degrade to empty payloads.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        let Envelope { event, data } = serde_json::from_str(text)?;
        let message = match event.as_str() {
            "timer-control" => Self::TimerControl(lenient(data)),
            "settings-update" => Self::SettingsUpdate(lenient(data)),
            "manual-adjust" => Self::ManualAdjust(lenient(data)),
            "request-state" => Self::RequestState,
            _ => Self::Unknown(event),
        };
        Ok(message)
    }
}

fn lenient<T>(data: Value) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    serde_json::from_value(data).unwrap_or_default()
}

/// Payload of `timer-control`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerControlPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub remaining_seconds: Option<Value>,
    #[serde(default)]
    pub happy_hour: Option<Value>,
}

impl TimerControlPayload {
    /// Resolve the command; unknown actions yield `None`.
    pub fn command(&self) -> Option<TimerControl> {
        let command = match self.action.as_deref()? {
            "start" => TimerControl::Start,
            "pause" => TimerControl::Pause,
            "reset" => TimerControl::Reset,
            "set-time" => TimerControl::SetTime(sanitize::opt_non_negative_int(
                self.remaining_seconds.as_ref(),
            )),
            "set-happy-hour" => {
                TimerControl::SetHappyHour(self.happy_hour.as_ref().is_some_and(sanitize::flag))
            }
            _ => return None,
        };
        Some(command)
    }
}

/// Payload of `settings-update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdatePayload {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// Payload of `manual-adjust`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAdjustPayload {
    #[serde(default)]
    pub add_seconds: Option<Value>,
    #[serde(default)]
    pub add_subs: Option<Value>,
    #[serde(default)]
    pub add_bits: Option<Value>,
    #[serde(default)]
    pub reason: Option<Value>,
}

impl From<&ManualAdjustPayload> for Adjustment {
    fn from(payload: &ManualAdjustPayload) -> Self {
        Adjustment {
            add_seconds: sanitize::opt_non_negative_int(payload.add_seconds.as_ref()),
            add_subs: sanitize::opt_non_negative_int(payload.add_subs.as_ref()),
            add_bits: sanitize::opt_non_negative_int(payload.add_bits.as_ref()),
            reason: sanitize::first_non_empty([payload.reason.as_ref()])
                .unwrap_or_else(|| DEFAULT_MANUAL_REASON.to_string()),
            debug: None,
        }
    }
}

/// Message pushed to observers.
#[derive(Debug, Serialize)]
pub struct ObserverOutboundMessage<'a> {
    pub event: &'static str,
    pub data: &'a TimerSnapshot,
}

impl<'a> ObserverOutboundMessage<'a> {
    /// Wrap a snapshot in a `timer-update` message.
    pub fn timer_update(data: &'a TimerSnapshot) -> Self {
        Self {
            event: EVENT_TIMER_UPDATE,
            data,
        }
    }
}
