//! In-memory ledger state shared by the storage backends.
//!
//! Mutations are split into a `prepare_*` step that validates and assigns
//! ids without touching the state, and an `insert_*`/`remove_*` step that
//! applies the result. Durable backends write their journal between the two.

use std::collections::{BTreeMap, HashMap};

use crate::error::StorageError;
use crate::record::{EventRecord, LotRecord, NewEventRecord, NewLotRecord};

#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    /// Lots keyed by internal id; ids increase in creation order.
    lots: BTreeMap<i64, LotRecord>,
    /// Business key -> internal id.
    keys: HashMap<String, i64>,
    /// Events per lot, in append order.
    events: HashMap<i64, Vec<EventRecord>>,
    next_lot_id: i64,
    next_event_id: i64,
}

impl LedgerState {
    pub(crate) fn new() -> Self {
        LedgerState {
            next_lot_id: 1,
            next_event_id: 1,
            ..Default::default()
        }
    }

    pub(crate) fn find_lot(&self, lot_id: &str) -> Option<LotRecord> {
        self.keys
            .get(lot_id)
            .and_then(|id| self.lots.get(id))
            .cloned()
    }

    pub(crate) fn list_lots(&self) -> Vec<LotRecord> {
        self.lots.values().cloned().collect()
    }

    pub(crate) fn prepare_lot(&self, lot: NewLotRecord) -> Result<LotRecord, StorageError> {
        if self.keys.contains_key(&lot.lot_id) {
            return Err(StorageError::LotAlreadyExists { lot_id: lot.lot_id });
        }
        Ok(lot.into_record(self.next_lot_id))
    }

    pub(crate) fn insert_lot(&mut self, lot: LotRecord) -> Result<(), StorageError> {
        if self.keys.contains_key(&lot.lot_id) {
            return Err(StorageError::LotAlreadyExists { lot_id: lot.lot_id });
        }
        self.next_lot_id = self.next_lot_id.max(lot.id + 1);
        self.keys.insert(lot.lot_id.clone(), lot.id);
        self.lots.insert(lot.id, lot);
        Ok(())
    }

    /// Internal id of the lot a delete would remove.
    pub(crate) fn prepare_delete(&self, lot_id: &str) -> Result<i64, StorageError> {
        self.keys
            .get(lot_id)
            .copied()
            .ok_or_else(|| StorageError::LotNotFound {
                lot: lot_id.to_string(),
            })
    }

    pub(crate) fn remove_lot(&mut self, lot_id: &str) -> Result<(), StorageError> {
        let id = self.prepare_delete(lot_id)?;
        self.keys.remove(lot_id);
        self.lots.remove(&id);
        self.events.remove(&id);
        Ok(())
    }

    pub(crate) fn find_last_event(&self, lot: i64) -> Option<EventRecord> {
        self.events.get(&lot).and_then(|evs| evs.last()).cloned()
    }

    pub(crate) fn list_events(&self, lot: i64) -> Vec<EventRecord> {
        self.events.get(&lot).cloned().unwrap_or_default()
    }

    pub(crate) fn prepare_event(&self, record: NewEventRecord) -> Result<EventRecord, StorageError> {
        if !self.lots.contains_key(&record.lot) {
            return Err(StorageError::lot_id_not_found(record.lot));
        }
        Ok(record.into_record(self.next_event_id))
    }

    pub(crate) fn insert_event(&mut self, record: EventRecord) -> Result<(), StorageError> {
        if !self.lots.contains_key(&record.lot) {
            return Err(StorageError::lot_id_not_found(record.lot));
        }
        self.next_event_id = self.next_event_id.max(record.id + 1);
        self.events.entry(record.lot).or_default().push(record);
        Ok(())
    }
}
