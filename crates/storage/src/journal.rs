//! Durable `LotStore` backed by an append-only JSON-lines journal.
//!
//! Every mutation is appended to the journal and synced to disk before it
//! is applied to the in-memory view, so a record a caller has seen is always
//! on disk. Opening a journal replays it from the first line.
//!
//! The file is held under an exclusive advisory lock for the lifetime of the
//! store; a second `open` of the same path, from this or another process,
//! fails instead of forking the chain.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::{EventRecord, LotRecord, NewEventRecord, NewLotRecord};
use crate::state::LedgerState;
use crate::traits::LotStore;

/// One line of the journal file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    CreateLot { lot: LotRecord },
    AppendEvent { event: EventRecord },
    DeleteLot { lot_id: String },
}

struct Journal {
    state: LedgerState,
    file: File,
}

impl Journal {
    /// Append one line and sync it. On failure the file is cut back to its
    /// previous length so no partial line stays behind.
    fn write_entry(&mut self, entry: &JournalEntry) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| StorageError::Backend(format!("journal encode: {e}")))?;
        line.push('\n');
        let len = self.file.metadata()?.len();
        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            if let Err(trunc) = self.file.set_len(len) {
                tracing::error!(error = %trunc, "failed to roll back partial journal write");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

pub struct JournalStore {
    path: PathBuf,
    inner: Arc<RwLock<Journal>>,
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JournalStore {
    /// Open (or create) the journal at `path`, lock it, and replay it.
    ///
    /// An incomplete final line (no trailing newline, as left by a crash
    /// mid-write) is discarded and cut from the file. Any other line that
    /// does not decode is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            StorageError::Backend(format!("journal in use: {}: {e}", path.display()))
        })?;

        let mut state = LedgerState::new();
        let mut replayed = 0usize;
        let mut reader = BufReader::new(&file);
        let mut buf = Vec::new();
        let mut complete_len = 0u64;
        let mut line_no = 0usize;
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            line_no += 1;
            if buf.last() != Some(&b'\n') {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no,
                    bytes = n,
                    "discarding incomplete journal entry"
                );
                file.set_len(complete_len)?;
                break;
            }
            complete_len += n as u64;

            let corrupt = |detail: String| {
                StorageError::Backend(format!(
                    "corrupt journal entry at {}:{}: {detail}",
                    path.display(),
                    line_no
                ))
            };
            let line = std::str::from_utf8(&buf).map_err(|e| corrupt(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry =
                serde_json::from_str(line).map_err(|e| corrupt(e.to_string()))?;
            match entry {
                JournalEntry::CreateLot { lot } => state.insert_lot(lot)?,
                JournalEntry::AppendEvent { event } => state.insert_event(event)?,
                JournalEntry::DeleteLot { lot_id } => state.remove_lot(&lot_id)?,
            }
            replayed += 1;
        }
        drop(reader);
        tracing::debug!(path = %path.display(), entries = replayed, "journal replayed");

        Ok(JournalStore {
            path,
            inner: Arc::new(RwLock::new(Journal { state, file })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Journal>, StorageError> {
        self.inner
            .read()
            .map_err(|_| StorageError::Backend("journal lock poisoned".to_string()))
    }

    /// Run a mutation on the blocking pool: it writes and syncs the file
    /// while holding the journal's write lock.
    async fn mutate<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Journal) -> Result<T, StorageError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut journal: RwLockWriteGuard<'_, Journal> = inner
                .write()
                .map_err(|_| StorageError::Backend("journal lock poisoned".to_string()))?;
            f(&mut journal)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("journal task failed: {e}")))?
    }
}

#[async_trait]
impl LotStore for JournalStore {
    async fn find_lot(&self, lot_id: &str) -> Result<Option<LotRecord>, StorageError> {
        Ok(self.read()?.state.find_lot(lot_id))
    }

    async fn create_lot(&self, lot: NewLotRecord) -> Result<LotRecord, StorageError> {
        self.mutate(move |journal| {
            let record = journal.state.prepare_lot(lot)?;
            journal.write_entry(&JournalEntry::CreateLot {
                lot: record.clone(),
            })?;
            journal.state.insert_lot(record.clone())?;
            Ok(record)
        })
        .await
    }

    async fn list_lots(&self) -> Result<Vec<LotRecord>, StorageError> {
        Ok(self.read()?.state.list_lots())
    }

    async fn delete_lot(&self, lot_id: &str) -> Result<(), StorageError> {
        let lot_id = lot_id.to_string();
        self.mutate(move |journal| {
            journal.state.prepare_delete(&lot_id)?;
            journal.write_entry(&JournalEntry::DeleteLot {
                lot_id: lot_id.clone(),
            })?;
            journal.state.remove_lot(&lot_id)
        })
        .await
    }

    async fn find_last_event(&self, lot: i64) -> Result<Option<EventRecord>, StorageError> {
        Ok(self.read()?.state.find_last_event(lot))
    }

    async fn append_event(&self, record: NewEventRecord) -> Result<EventRecord, StorageError> {
        self.mutate(move |journal| {
            let record = journal.state.prepare_event(record)?;
            journal.write_entry(&JournalEntry::AppendEvent {
                event: record.clone(),
            })?;
            journal.state.insert_event(record.clone())?;
            Ok(record)
        })
        .await
    }

    async fn list_events(&self, lot: i64) -> Result<Vec<EventRecord>, StorageError> {
        Ok(self.read()?.state.list_events(lot))
    }
}
