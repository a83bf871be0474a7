use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{EventRecord, LotRecord, NewEventRecord, NewLotRecord};
use crate::state::LedgerState;
use crate::traits::LotStore;

/// Volatile `LotStore` backed by lock-protected maps.
///
/// Suitable for tests and for running the server without a data file.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<LedgerState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            state: RwLock::new(LedgerState::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StorageError> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StorageError> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LotStore for MemoryStore {
    async fn find_lot(&self, lot_id: &str) -> Result<Option<LotRecord>, StorageError> {
        Ok(self.read()?.find_lot(lot_id))
    }

    async fn create_lot(&self, lot: NewLotRecord) -> Result<LotRecord, StorageError> {
        let mut state = self.write()?;
        let record = state.prepare_lot(lot)?;
        state.insert_lot(record.clone())?;
        Ok(record)
    }

    async fn list_lots(&self) -> Result<Vec<LotRecord>, StorageError> {
        Ok(self.read()?.list_lots())
    }

    async fn delete_lot(&self, lot_id: &str) -> Result<(), StorageError> {
        self.write()?.remove_lot(lot_id)
    }

    async fn find_last_event(&self, lot: i64) -> Result<Option<EventRecord>, StorageError> {
        Ok(self.read()?.find_last_event(lot))
    }

    async fn append_event(&self, record: NewEventRecord) -> Result<EventRecord, StorageError> {
        let mut state = self.write()?;
        let record = state.prepare_event(record)?;
        state.insert_event(record.clone())?;
        Ok(record)
    }

    async fn list_events(&self, lot: i64) -> Result<Vec<EventRecord>, StorageError> {
        Ok(self.read()?.list_events(lot))
    }
}
