pub mod engine;
pub mod persistence;
mod sse;
pub mod timer;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{dao::snapshot_store::SnapshotStore, ingest::IngestPipeline};

pub use self::sse::SseHub;
use self::{engine::TimerEngine, persistence::WriteScheduler, timer::TimerState};

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 16;

#[derive(Clone)]
/// Handle used to push messages to a connected observer.
pub struct ObserverConnection {
    pub id: Uuid,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Persistence bookkeeping guarded by a single lock.
#[derive(Default)]
pub struct PersistenceSlot {
    pub scheduler: WriteScheduler,
    /// Armed debounce timer, cancelled on shutdown.
    pub debounce: Option<JoinHandle<()>>,
}

/// Central application state: the timer engine, the ingestion pipeline, connected
/// observers and the persistence writer.
pub struct AppState {
    engine: Mutex<TimerEngine>,
    ingest: Mutex<IngestPipeline>,
    observers: DashMap<Uuid, ObserverConnection>,
    sse: SseHub,
    store: Arc<dyn SnapshotStore>,
    persistence: Mutex<PersistenceSlot>,
    write_gate: Mutex<()>,
    degraded: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] around a restored timer state, wrapped in an [`Arc`] so it
    /// can be cloned cheaply.
    pub fn new(initial: TimerState, store: Arc<dyn SnapshotStore>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        let (shutdown_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            engine: Mutex::new(TimerEngine::new(initial)),
            ingest: Mutex::new(IngestPipeline::new()),
            observers: DashMap::new(),
            sse: SseHub::new(SSE_CAPACITY),
            store,
            persistence: Mutex::new(PersistenceSlot::default()),
            write_gate: Mutex::new(()),
            degraded: degraded_tx,
            shutdown: shutdown_tx,
        })
    }

    /// The timer engine. Mutations must go through the timer service so they are broadcast and
    /// persisted.
    pub fn engine(&self) -> &Mutex<TimerEngine> {
        &self.engine
    }

    /// Provider ingestion pipeline.
    pub fn ingest(&self) -> &Mutex<IngestPipeline> {
        &self.ingest
    }

    /// Registry of connected observer sockets keyed by connection id.
    pub fn observers(&self) -> &DashMap<Uuid, ObserverConnection> {
        &self.observers
    }

    /// Broadcast hub used for the SSE snapshot stream.
    pub fn timer_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Durable snapshot store.
    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        self.store.clone()
    }

    /// Debounce and writer bookkeeping.
    pub fn persistence(&self) -> &Mutex<PersistenceSlot> {
        &self.persistence
    }

    /// Held for the duration of every store write so at most one is in flight.
    pub fn write_gate(&self) -> &Mutex<()> {
        &self.write_gate
    }

    /// Copy of the current timer state.
    pub async fn snapshot(&self) -> TimerState {
        self.engine.lock().await.snapshot()
    }

    /// Whether the last durable write failed.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag, notifying watchers only when it changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Signal every long-lived stream to end; the server is going down.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Subscribe to the shutdown signal. Already `true` once shutdown began.
    pub fn shutdown_watcher(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
