use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info};

use crate::{
    dto::{
        provider::RawProviderEvent,
        ws::{ManualAdjustPayload, TimerControlPayload},
    },
    ingest::SWEEP_INTERVAL,
    services::{broadcast, persistence_service},
    state::{
        SharedState,
        engine::TimerEngine,
        timer::{Adjustment, TimerState, now_ms},
    },
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Run `mutate` against the engine and, when it produced a new version, broadcast it before
/// releasing the lock and schedule a durable write.
pub async fn commit<F>(state: &SharedState, mutate: F) -> Option<TimerState>
where
    F: FnOnce(&mut TimerEngine, i64) -> Option<TimerState>,
{
    let committed = {
        let mut engine = state.engine().lock().await;
        let committed = mutate(&mut *engine, now_ms())?;
        broadcast::publish_snapshot(state, &committed);
        committed
    };
    persistence_service::request_persist(state).await;
    Some(committed)
}

/// Apply an adjustment coming from ingestion or an observer.
pub async fn apply_adjustment(state: &SharedState, adjustment: &Adjustment) -> TimerState {
    let committed = commit(state, |engine, now| {
        Some(engine.apply_adjustment(adjustment, now))
    })
    .await;
    // `apply_adjustment` always commits.
    match committed {
        Some(committed) => committed,
        None => state.snapshot().await,
    }
}

/// Feed a raw provider event through ingestion. Returns whether it changed the timer.
///
/// The scoring configuration is read under the same engine lock that applies the adjustment,
/// so a concurrent settings change is either fully before or fully after the event.
pub async fn ingest_provider_event(state: &SharedState, event: &RawProviderEvent) -> bool {
    // Holding the ingest lock across the commit keeps adjustments in arrival order.
    let mut ingest = state.ingest().lock().await;
    let mut applied = None;
    let committed = commit(state, |engine, now| {
        let adjustment = ingest.process(event, engine.state(), Instant::now())?;
        let committed = engine.apply_adjustment(&adjustment, now);
        applied = Some(adjustment);
        Some(committed)
    })
    .await;

    let (Some(committed), Some(adjustment)) = (committed, applied) else {
        return false;
    };
    info!(
        reason = %adjustment.reason,
        add_seconds = adjustment.add_seconds,
        remaining = committed.remaining_seconds,
        version = committed.state_version,
        "applied provider event"
    );
    true
}

/// Execute a `timer-control` message. `None` means the command was ignored.
pub async fn handle_control(
    state: &SharedState,
    payload: &TimerControlPayload,
) -> Option<TimerState> {
    let Some(command) = payload.command() else {
        debug!(action = ?payload.action, "ignoring unknown timer action");
        return None;
    };
    let committed = commit(state, |engine, now| engine.control(command, now)).await;
    if committed.is_some() {
        info!(?command, "timer control applied");
    }
    committed
}

/// Execute a `settings-update` message. `None` means the update was ignored.
pub async fn update_setting(state: &SharedState, key: Option<&str>, value: &Value) -> Option<TimerState> {
    let key = key?;
    commit(state, |engine, now| engine.update_setting(key, value, now)).await
}

/// Execute a `manual-adjust` message.
pub async fn manual_adjust(state: &SharedState, payload: &ManualAdjustPayload) -> TimerState {
    let adjustment = Adjustment::from(payload);
    info!(reason = %adjustment.reason, add_seconds = adjustment.add_seconds, "manual adjustment");
    apply_adjustment(state, &adjustment).await
}

/// Spawn the once-per-second countdown.
pub fn spawn_ticker(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Some(committed) = commit(&state, |engine, now| engine.tick(now)).await {
                if !committed.is_running {
                    info!("timer reached zero");
                }
            }
        }
    })
}

/// Spawn the periodic expiry sweep of the ingestion tables.
pub fn spawn_ingest_sweeper(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sweeper = interval(SWEEP_INTERVAL);
        sweeper.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweeper.tick().await;
        loop {
            sweeper.tick().await;
            state.ingest().lock().await.sweep(Instant::now());
        }
    })
}
