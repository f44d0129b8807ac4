mod file;
mod memory;

pub use file::{FileSnapshotStore, FileStoreError};
pub use memory::MemorySnapshotStore;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::{dao::storage::StorageResult, state::timer::TimerState};

/// Abstraction over the durable medium holding the latest timer snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Read the last written snapshot as a loosely typed record, `None` when nothing was written.
    fn load(&self) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Replace the stored snapshot.
    fn save(&self, snapshot: TimerState) -> BoxFuture<'static, StorageResult<()>>;
}
