use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{OneOrMany, formats::PreferMany, serde_as};
use utoipa::ToSchema;

/// Provider event as delivered by the alert socket or the webhook route.
///
/// Every field is optional and loosely typed; interpretation happens in the ingestion
/// pipeline so that odd payloads degrade to "no adjustment" instead of a decode error.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProviderEvent {
    #[serde(rename = "type", default)]
    pub event_type: Option<Value>,
    #[serde(default)]
    pub event_id: Option<Value>,
    /// Account the event belongs to (`twitch_account`, `youtube_account`, ...).
    #[serde(rename = "for", default)]
    pub target: Option<Value>,
    #[serde_as(as = "OneOrMany<_, PreferMany>")]
    #[serde(default)]
    pub message: Vec<RawEventMessage>,
}

impl RawProviderEvent {
    /// Only the first message entry carries meaning for the timer.
    pub fn first_message(&self) -> Option<&RawEventMessage> {
        self.message.first()
    }
}

/// Single entry of the provider `message` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEventMessage {
    #[serde(default)]
    pub sub_type: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub gifter: Option<Value>,
    #[serde(default)]
    pub receiver: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub months: Option<Value>,
    #[serde(default)]
    pub sub_plan: Option<Value>,
    #[serde(default)]
    pub sub_plan_name: Option<Value>,
    #[serde(default)]
    pub repeat: Option<Value>,
    #[serde(rename = "_id", default)]
    pub underscore_id: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub event_id: Option<Value>,
}

/// Response of the webhook ingestion route.
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    /// Whether the event produced an adjustment.
    pub applied: bool,
}
