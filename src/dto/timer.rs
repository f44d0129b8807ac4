use serde::Serialize;
use utoipa::ToSchema;

use crate::state::timer::{EventSeconds, TimerState};

/// Seconds configured per scoring category.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventSecondsDto {
    pub bits: u64,
    pub prime_t1: u64,
    pub t2: u64,
    pub t3: u64,
    pub bomb10: u64,
    pub bomb20: u64,
    pub bomb50: u64,
    pub bomb100: u64,
}

impl From<&EventSeconds> for EventSecondsDto {
    fn from(value: &EventSeconds) -> Self {
        Self {
            bits: value.bits,
            prime_t1: value.prime_t1,
            t2: value.t2,
            t3: value.t3,
            bomb10: value.bomb10,
            bomb20: value.bomb20,
            bomb50: value.bomb50,
            bomb100: value.bomb100,
        }
    }
}

/// Full timer state as replicated to observers.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub subs: u64,
    pub bits: u64,
    pub happy_hour: bool,
    pub event_seconds: EventSecondsDto,
    /// Strictly increasing; observers drop snapshots older than the one displayed.
    pub state_version: u64,
    /// Epoch milliseconds of the last mutation.
    pub updated_at: i64,
    /// Legacy mirror of `eventSeconds.primeT1` read by older overlays.
    pub seconds_per_sub: u64,
}

impl From<&TimerState> for TimerSnapshot {
    fn from(state: &TimerState) -> Self {
        Self {
            remaining_seconds: state.remaining_seconds,
            is_running: state.is_running,
            subs: state.subs,
            bits: state.bits,
            happy_hour: state.happy_hour,
            event_seconds: EventSecondsDto::from(&state.event_seconds),
            state_version: state.state_version,
            updated_at: state.updated_at,
            seconds_per_sub: state.event_seconds.prime_t1,
        }
    }
}
