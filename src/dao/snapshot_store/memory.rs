use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use futures::future::BoxFuture;
use serde_json::Value;

use super::SnapshotStore;
use crate::{
    dao::storage::{StorageError, StorageResult},
    state::timer::TimerState,
};

/// Volatile store used when no durable medium is wanted, and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    record: Mutex<Option<Value>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a raw record.
    pub fn with_record(record: Value) -> Self {
        let store = Self::default();
        if let Ok(mut slot) = store.inner.record.lock() {
            *slot = Some(record);
        }
        store
    }

    /// Last successfully saved record.
    pub fn record(&self) -> Option<Value> {
        self.inner.record.lock().ok().and_then(|slot| slot.clone())
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("memory store configured to fail")]
struct InjectedFailure;

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StorageError::unavailable(
                    "injected failure".into(),
                    InjectedFailure,
                ))
            });
        }
        let record = self.record();
        Box::pin(async move { Ok(record) })
    }

    fn save(&self, snapshot: TimerState) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if inner.failing.load(Ordering::SeqCst) {
                return Err(StorageError::unavailable(
                    "injected failure".into(),
                    InjectedFailure,
                ));
            }
            let value = serde_json::to_value(&snapshot)
                .map_err(|err| StorageError::corrupt("encode snapshot".into(), err))?;
            if let Ok(mut slot) = inner.record.lock() {
                *slot = Some(value);
            }
            inner.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
