use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    dao::snapshot_store::SnapshotStore,
    state::{SharedState, persistence::WriteDecision, timer::TimerState},
};

/// Quiet period before a burst of mutations is written out.
pub const DEBOUNCE: Duration = Duration::from_millis(120);

/// Load the persisted snapshot, falling back to defaults when it is missing or unreadable.
pub async fn load_initial_state(store: &dyn SnapshotStore, now_ms: i64) -> TimerState {
    match store.load().await {
        Ok(Some(raw)) => {
            let restored = TimerState::restore(&raw, now_ms);
            info!(
                version = restored.state_version,
                remaining = restored.remaining_seconds,
                "restored timer snapshot"
            );
            restored
        }
        Ok(None) => {
            info!("no timer snapshot found; starting from defaults");
            TimerState::default()
        }
        Err(err) => {
            warn!(error = %err, "failed to load timer snapshot; starting from defaults");
            TimerState::default()
        }
    }
}

/// Record that the timer changed and arm the debounce timer if needed.
pub async fn request_persist(state: &SharedState) {
    let mut slot = state.persistence().lock().await;
    if !slot.scheduler.request() {
        return;
    }
    let task_state = state.clone();
    slot.debounce = Some(tokio::spawn(async move {
        sleep(DEBOUNCE).await;
        on_debounce_elapsed(task_state).await;
    }));
}

async fn on_debounce_elapsed(state: SharedState) {
    let decision = {
        let mut slot = state.persistence().lock().await;
        slot.debounce = None;
        slot.scheduler.debounce_elapsed()
    };
    match decision {
        WriteDecision::Start => {
            tokio::spawn(write_loop(state));
        }
        WriteDecision::Deferred => debug!("snapshot write in flight; coalescing request"),
        WriteDecision::Done => {}
    }
}

/// Write the current snapshot until no request is pending.
async fn write_loop(state: SharedState) {
    loop {
        write_current(&state).await;

        let decision = state.persistence().lock().await.scheduler.write_finished();
        if decision != WriteDecision::Start {
            break;
        }
    }
}

/// Write the state as it is once the gate is held, so a write never lands an older version over
/// a newer one.
async fn write_current(state: &SharedState) {
    let _gate = state.write_gate().lock().await;
    let snapshot = state.snapshot().await;
    let version = snapshot.state_version;
    match state.store().save(snapshot).await {
        Ok(()) => {
            if state.is_degraded() {
                info!("snapshot write succeeded; leaving degraded mode");
            }
            state.update_degraded(false);
            debug!(version, "persisted timer snapshot");
        }
        Err(err) => {
            error!(error = %err, version, "failed to persist timer snapshot");
            state.update_degraded(true);
        }
    }
}

/// Stop scheduling writes, wait for any in-flight write and save the final state.
pub async fn flush_on_shutdown(state: &SharedState) {
    {
        let mut slot = state.persistence().lock().await;
        if slot.scheduler.close() {
            debug!("cancelled pending debounced write");
        }
        if let Some(handle) = slot.debounce.take() {
            handle.abort();
        }
    }
    info!("flushing timer snapshot before exit");
    write_current(state).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        dao::{snapshot_store::MemorySnapshotStore, storage::StorageResult},
        services::timer_service,
        state::{AppState, timer::Adjustment},
    };

    const SAVE_LATENCY: Duration = Duration::from_secs(1);

    /// Memory store whose saves take [`SAVE_LATENCY`] to complete.
    struct SlowStore(MemorySnapshotStore);

    impl SnapshotStore for SlowStore {
        fn load(&self) -> BoxFuture<'static, StorageResult<Option<Value>>> {
            self.0.load()
        }

        fn save(&self, snapshot: TimerState) -> BoxFuture<'static, StorageResult<()>> {
            let save = self.0.save(snapshot);
            Box::pin(async move {
                sleep(SAVE_LATENCY).await;
                save.await
            })
        }
    }

    fn shared(store: &MemorySnapshotStore) -> SharedState {
        AppState::new(TimerState::default(), Arc::new(store.clone()))
    }

    fn slow(store: &MemorySnapshotStore) -> SharedState {
        AppState::new(TimerState::default(), Arc::new(SlowStore(store.clone())))
    }

    async fn bump(state: &SharedState) {
        timer_service::apply_adjustment(state, &Adjustment::with_reason("test")).await;
    }

    #[tokio::test]
    async fn missing_or_broken_record_yields_defaults() {
        let store = MemorySnapshotStore::new();
        assert_eq!(load_initial_state(&store, 0).await, TimerState::default());

        store.set_failing(true);
        assert_eq!(load_initial_state(&store, 0).await, TimerState::default());
    }

    #[tokio::test]
    async fn restores_and_catches_up() {
        let store = MemorySnapshotStore::with_record(json!({
            "remainingSeconds": 100,
            "isRunning": true,
            "stateVersion": 7,
            "updatedAt": 1_000
        }));
        let restored = load_initial_state(&store, 31_500).await;
        assert_eq!(restored.remaining_seconds, 70);
        assert!(restored.is_running);
        assert_eq!(restored.state_version, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_is_written_once() {
        let store = MemorySnapshotStore::new();
        let state = shared(&store);

        for _ in 0..5 {
            timer_service::apply_adjustment(&state, &Adjustment::with_reason("test")).await;
        }
        sleep(DEBOUNCE * 2).await;

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.record().unwrap()["stateVersion"], json!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_enters_degraded_mode_until_next_success() {
        let store = MemorySnapshotStore::new();
        store.set_failing(true);
        let state = shared(&store);

        timer_service::apply_adjustment(&state, &Adjustment::with_reason("test")).await;
        sleep(DEBOUNCE * 2).await;
        assert!(state.is_degraded());

        store.set_failing(false);
        timer_service::apply_adjustment(&state, &Adjustment::with_reason("test")).await;
        sleep(DEBOUNCE * 2).await;
        assert!(!state.is_degraded());
        assert_eq!(store.record().unwrap()["stateVersion"], json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flush_writes_latest_state_and_cancels_debounce() {
        let store = MemorySnapshotStore::new();
        let state = shared(&store);

        timer_service::apply_adjustment(&state, &Adjustment::with_reason("test")).await;
        flush_on_shutdown(&state).await;
        assert_eq!(store.save_count(), 1);

        timer_service::apply_adjustment(&state, &Adjustment::with_reason("late")).await;
        sleep(DEBOUNCE * 2).await;
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_during_write_triggers_second_save_at_latest_version() {
        let store = MemorySnapshotStore::new();
        let state = slow(&store);

        bump(&state).await;
        sleep(DEBOUNCE + Duration::from_millis(10)).await;
        // First write is now in flight.
        bump(&state).await;
        bump(&state).await;
        sleep(DEBOUNCE + Duration::from_millis(10)).await;
        assert_eq!(store.save_count(), 0);

        sleep(SAVE_LATENCY * 3).await;
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.record().unwrap()["stateVersion"], json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flush_lands_after_in_flight_write() {
        let store = MemorySnapshotStore::new();
        let state = slow(&store);

        bump(&state).await;
        sleep(DEBOUNCE + Duration::from_millis(10)).await;
        bump(&state).await;

        flush_on_shutdown(&state).await;
        assert_eq!(store.record().unwrap()["stateVersion"], json!(2));

        sleep(SAVE_LATENCY * 3).await;
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.record().unwrap()["stateVersion"], json!(2));
    }
}
