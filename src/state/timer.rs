use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::info;

use crate::sanitize;

/// Seconds per subscription used for the tier categories until configured otherwise.
pub const DEFAULT_SECONDS_PER_SUB: u64 = 300;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000_000) as i64
}

/// Scoring categories whose seconds value can be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Seconds granted per cheer event.
    Bits,
    /// Tier 1 and Prime subscriptions.
    PrimeT1,
    /// Tier 2 subscriptions.
    T2,
    /// Tier 3 subscriptions.
    T3,
    /// Bonus for a bulk gift of exactly 10.
    Bomb10,
    /// Bonus for a bulk gift of exactly 20.
    Bomb20,
    /// Bonus for a bulk gift of exactly 50.
    Bomb50,
    /// Bonus for a bulk gift of exactly 100.
    Bomb100,
}

impl EventCategory {
    /// Every category, in display order.
    pub const ALL: [EventCategory; 8] = [
        EventCategory::Bits,
        EventCategory::PrimeT1,
        EventCategory::T2,
        EventCategory::T3,
        EventCategory::Bomb10,
        EventCategory::Bomb20,
        EventCategory::Bomb50,
        EventCategory::Bomb100,
    ];

    /// Wire name used in settings updates and snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bits => "bits",
            Self::PrimeT1 => "primeT1",
            Self::T2 => "t2",
            Self::T3 => "t3",
            Self::Bomb10 => "bomb10",
            Self::Bomb20 => "bomb20",
            Self::Bomb50 => "bomb50",
            Self::Bomb100 => "bomb100",
        }
    }

    /// Bonus category awarded for a bulk gift of exactly `count` subscriptions.
    pub fn bomb_for_count(count: u64) -> Option<Self> {
        match count {
            10 => Some(Self::Bomb10),
            20 => Some(Self::Bomb20),
            50 => Some(Self::Bomb50),
            100 => Some(Self::Bomb100),
            _ => None,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a settings key is outside the fixed category set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl FromStr for EventCategory {
    type Err = UnknownCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| UnknownCategory(value.to_string()))
    }
}

/// Configured seconds for every [`EventCategory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSeconds {
    pub bits: u64,
    pub prime_t1: u64,
    pub t2: u64,
    pub t3: u64,
    pub bomb10: u64,
    pub bomb20: u64,
    pub bomb50: u64,
    pub bomb100: u64,
}

impl Default for EventSeconds {
    fn default() -> Self {
        Self {
            bits: 0,
            prime_t1: DEFAULT_SECONDS_PER_SUB,
            t2: DEFAULT_SECONDS_PER_SUB,
            t3: DEFAULT_SECONDS_PER_SUB,
            bomb10: 0,
            bomb20: 0,
            bomb50: 0,
            bomb100: 0,
        }
    }
}

impl EventSeconds {
    /// Configured seconds for `category`.
    pub fn get(&self, category: EventCategory) -> u64 {
        match category {
            EventCategory::Bits => self.bits,
            EventCategory::PrimeT1 => self.prime_t1,
            EventCategory::T2 => self.t2,
            EventCategory::T3 => self.t3,
            EventCategory::Bomb10 => self.bomb10,
            EventCategory::Bomb20 => self.bomb20,
            EventCategory::Bomb50 => self.bomb50,
            EventCategory::Bomb100 => self.bomb100,
        }
    }

    /// Overwrite the seconds configured for `category`.
    pub fn set(&mut self, category: EventCategory, seconds: u64) {
        let slot = match category {
            EventCategory::Bits => &mut self.bits,
            EventCategory::PrimeT1 => &mut self.prime_t1,
            EventCategory::T2 => &mut self.t2,
            EventCategory::T3 => &mut self.t3,
            EventCategory::Bomb10 => &mut self.bomb10,
            EventCategory::Bomb20 => &mut self.bomb20,
            EventCategory::Bomb50 => &mut self.bomb50,
            EventCategory::Bomb100 => &mut self.bomb100,
        };
        *slot = seconds;
    }

    /// Build from a loosely typed object, defaulting missing keys and clamping values.
    fn from_value(value: Option<&Value>) -> Self {
        let mut seconds = Self::default();
        if let Some(Value::Object(map)) = value {
            for category in EventCategory::ALL {
                if let Some(raw) = map.get(category.as_str()) {
                    seconds.set(category, sanitize::non_negative_int(raw));
                }
            }
        }
        seconds
    }
}

/// The single authoritative countdown state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub subs: u64,
    pub bits: u64,
    pub happy_hour: bool,
    pub event_seconds: EventSeconds,
    pub state_version: u64,
    /// Wall-clock time of the last mutation, in epoch milliseconds.
    pub updated_at: i64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            remaining_seconds: 0,
            is_running: false,
            subs: 0,
            bits: 0,
            happy_hour: false,
            event_seconds: EventSeconds::default(),
            state_version: 0,
            updated_at: 0,
        }
    }
}

impl TimerState {
    /// Multiplier applied to every category while happy hour is on.
    pub fn multiplier(&self) -> u64 {
        if self.happy_hour { 2 } else { 1 }
    }

    /// Rebuild a state from a persisted record and catch up on time that passed while offline.
    ///
    /// Fields are sanitized individually so a partially corrupt record still restores whatever
    /// is usable. When the record says the timer was running, the whole seconds elapsed since
    /// `updatedAt` are subtracted from `remainingSeconds`; an exhausted timer is stopped.
    pub fn restore(raw: &Value, now_ms: i64) -> Self {
        let field = |name: &str| raw.get(name);

        let mut state = Self {
            remaining_seconds: sanitize::opt_non_negative_int(field("remainingSeconds")),
            is_running: field("isRunning").is_some_and(sanitize::flag),
            subs: sanitize::opt_non_negative_int(field("subs")),
            bits: sanitize::opt_non_negative_int(field("bits")),
            happy_hour: field("happyHour").is_some_and(sanitize::flag),
            event_seconds: EventSeconds::from_value(field("eventSeconds")),
            state_version: sanitize::opt_non_negative_int(field("stateVersion")),
            updated_at: i64::try_from(sanitize::opt_non_negative_int(field("updatedAt")))
                .unwrap_or(i64::MAX),
        };

        if state.is_running && state.updated_at > 0 {
            let elapsed_ms = now_ms.saturating_sub(state.updated_at).max(0);
            let elapsed_secs = (elapsed_ms / 1000) as u64;
            state.remaining_seconds = state.remaining_seconds.saturating_sub(elapsed_secs);
            if state.remaining_seconds == 0 {
                state.is_running = false;
            }
            state.updated_at = now_ms;
            info!(
                elapsed_secs,
                remaining = state.remaining_seconds,
                running = state.is_running,
                "caught up on time elapsed while offline"
            );
        }

        state
    }
}

/// Optional breakdown of how an [`Adjustment`] was computed, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentDebug {
    pub event: String,
    pub sub_seconds: u64,
    pub bonus_seconds: u64,
    pub total: u64,
}

/// Canonical change to apply to the timer, produced once per accepted event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub add_seconds: u64,
    pub add_subs: u64,
    pub add_bits: u64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<AdjustmentDebug>,
}

impl Adjustment {
    /// Empty adjustment carrying only a reason label.
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }
}
