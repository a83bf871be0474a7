//! Backend selection from the `--data` setting.

use std::path::Path;
use std::sync::Arc;

use tracechain_storage::{JournalStore, LotStore, MemoryStore, StorageError};

/// Journal used by the one-shot commands when `--data` is not given.
pub(crate) const DEFAULT_JOURNAL: &str = "tracechain.jsonl";

/// Open the journal at `data`, or an empty in-memory store when `None`.
pub(crate) fn open_store(data: Option<&Path>) -> Result<Arc<dyn LotStore>, StorageError> {
    match data {
        Some(path) => Ok(Arc::new(JournalStore::open(path)?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
