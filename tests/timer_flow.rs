use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use serde_json::{Value, json};
use subathon_timer::{
    dao::snapshot_store::MemorySnapshotStore,
    dto::{provider::RawProviderEvent, ws::TimerControlPayload},
    services::{persistence_service::DEBOUNCE, timer_service},
    state::{AppState, ObserverConnection, SharedState, timer::TimerState},
};
use tokio::sync::mpsc;
use uuid::Uuid;

fn running(remaining: u64) -> TimerState {
    TimerState {
        remaining_seconds: remaining,
        is_running: true,
        ..TimerState::default()
    }
}

fn observe(state: &SharedState) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    state.observers().insert(id, ObserverConnection { id, tx });
    rx
}

fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
    let Ok(Message::Text(text)) = rx.try_recv() else {
        panic!("expected a text frame");
    };
    let message: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(message["event"], "timer-update");
    message["data"].clone()
}

fn event(value: Value) -> RawProviderEvent {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn resub_extends_running_timer_and_notifies_observers() {
    let store = MemorySnapshotStore::new();
    let state = AppState::new(running(3600), Arc::new(store));
    let mut rx = observe(&state);

    let resub = event(json!({
        "type": "subscription",
        "message": [{ "_id": "evt-1", "sub_type": "resub", "sub_plan": "1000", "name": "bob" }]
    }));
    assert!(timer_service::ingest_provider_event(&state, &resub).await);

    let snapshot = next_snapshot(&mut rx);
    assert_eq!(snapshot["remainingSeconds"], 3900);
    assert_eq!(snapshot["subs"], 1);
    assert_eq!(snapshot["stateVersion"], 1);
    assert_eq!(snapshot["secondsPerSub"], 300);

    // Redelivery of the same event is dropped.
    assert!(!timer_service::ingest_provider_event(&state, &resub).await);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn bits_count_without_adding_time_by_default() {
    let state = AppState::new(running(60), Arc::new(MemorySnapshotStore::new()));
    let cheer = event(json!({ "type": "bits", "message": [{ "name": "bob", "amount": 100 }] }));

    assert!(timer_service::ingest_provider_event(&state, &cheer).await);
    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.remaining_seconds, 60);
    assert_eq!(snapshot.bits, 100);
    assert_eq!(snapshot.state_version, 1);
}

#[tokio::test]
async fn bulk_gift_is_counted_once() {
    let state = AppState::new(TimerState::default(), Arc::new(MemorySnapshotStore::new()));

    let bulk = event(json!({
        "type": "subMysteryGift",
        "message": [{ "_id": "bulk-1", "name": "Alice", "amount": 5, "sub_plan": "1000" }]
    }));
    assert!(timer_service::ingest_provider_event(&state, &bulk).await);

    for (index, recipient) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
        let gift = event(json!({
            "type": "subscription",
            "message": [{
                "_id": format!("gift-{index}"),
                "sub_type": "subgift",
                "gifter": "alice",
                "name": recipient,
                "sub_plan": "1000"
            }]
        }));
        assert!(!timer_service::ingest_provider_event(&state, &gift).await);
    }

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.subs, 5);
    assert_eq!(snapshot.remaining_seconds, 5 * 300);
    assert_eq!(snapshot.state_version, 1);
}

#[tokio::test]
async fn ignored_control_leaves_version_untouched() {
    let state = AppState::new(running(100), Arc::new(MemorySnapshotStore::new()));
    let set_time: TimerControlPayload = serde_json::from_value(json!({
        "action": "set-time",
        "remainingSeconds": 5
    }))
    .unwrap();

    assert!(timer_service::handle_control(&state, &set_time).await.is_none());
    assert_eq!(state.snapshot().await.state_version, 0);

    let pause: TimerControlPayload = serde_json::from_value(json!({ "action": "pause" })).unwrap();
    let paused = timer_service::handle_control(&state, &pause).await.unwrap();
    assert!(!paused.is_running);

    let applied = timer_service::handle_control(&state, &set_time).await.unwrap();
    assert_eq!(applied.remaining_seconds, 5);
    assert_eq!(applied.state_version, 2);
}

#[tokio::test(start_paused = true)]
async fn mutations_reach_the_store_after_the_debounce() {
    let store = MemorySnapshotStore::new();
    let state = AppState::new(running(10), Arc::new(store.clone()));

    let cheer = event(json!({ "type": "bits", "message": [{ "_id": "c-1", "amount": 50 }] }));
    timer_service::ingest_provider_event(&state, &cheer).await;
    assert_eq!(store.save_count(), 0);

    tokio::time::sleep(DEBOUNCE + Duration::from_millis(50)).await;
    let record = store.record().unwrap();
    assert_eq!(record["bits"], 50);
    assert_eq!(record["stateVersion"], 1);
    assert_eq!(record["isRunning"], true);
}

#[tokio::test(start_paused = true)]
async fn ticker_broadcasts_every_second_and_stops_at_zero() {
    let state = AppState::new(running(3), Arc::new(MemorySnapshotStore::new()));
    let mut rx = observe(&state);

    let ticker = timer_service::spawn_ticker(state.clone());
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    ticker.abort();

    for (version, remaining) in [(1, 2), (2, 1), (3, 0)] {
        let snapshot = next_snapshot(&mut rx);
        assert_eq!(snapshot["stateVersion"], version);
        assert_eq!(snapshot["remainingSeconds"], remaining);
    }
    assert_eq!(state.snapshot().await.state_version, 3);
    assert!(!state.snapshot().await.is_running);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn provider_event_is_scored_and_applied_atomically() {
    let state = AppState::new(TimerState::default(), Arc::new(MemorySnapshotStore::new()));
    let mut rx = observe(&state);

    let guard = state.engine().lock().await;
    let ingest = tokio::spawn({
        let state = state.clone();
        async move {
            let sub = event(json!({
                "type": "subscription",
                "message": [{ "_id": "evt-7", "sub_plan": "1000", "name": "bob" }]
            }));
            timer_service::ingest_provider_event(&state, &sub).await
        }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    let happy_hour = tokio::spawn({
        let state = state.clone();
        async move {
            let payload: TimerControlPayload =
                serde_json::from_value(json!({ "action": "set-happy-hour", "happyHour": true }))
                    .unwrap();
            timer_service::handle_control(&state, &payload).await
        }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    drop(guard);

    assert!(ingest.await.unwrap());
    assert!(happy_hour.await.unwrap().is_some());

    let first = next_snapshot(&mut rx);
    assert_eq!(first["stateVersion"], 1);
    assert_eq!(first["remainingSeconds"], 300);
    assert_eq!(first["happyHour"], false);

    let second = next_snapshot(&mut rx);
    assert_eq!(second["stateVersion"], 2);
    assert_eq!(second["happyHour"], true);
    assert_eq!(second["remainingSeconds"], 300);
}
