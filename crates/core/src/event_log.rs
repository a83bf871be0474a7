//! Append-only, hash-linked event log over a [`LotStore`].
//!
//! `EventLog` is the only writer of events. Appends to one lot are
//! serialized through a per-lot async mutex held from "read last event"
//! through "append record", so two appends can never chain off the same
//! predecessor. Appends to different lots and all reads run unlocked.
//! A lot's mutex is dropped from the lock map once no task holds or waits
//! on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracechain_storage::{LotRecord, LotStore, NewEventRecord, StorageError};

use crate::canonical::to_canonical_string;
use crate::error::TraceError;
use crate::event::{
    ChainEvent, EventKind, EventPayload, LotInfo, LotSummary, NewLot, Verification,
};
use crate::hash_chain::{compute_hash, to_payload_value, verify_chain, GENESIS};
use crate::quality::{self, Reading};

/// Source of default timestamps.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS[.ffffff]`, without offset.
/// The fraction is omitted when the microseconds are zero.
pub fn utc_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    let formatted = if now.microsecond() == 0 {
        now.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
    } else {
        now.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]"
        ))
    };
    formatted.unwrap_or_else(|_| now.to_string())
}

/// Per-lot append locks, keyed by business key.
#[derive(Default)]
struct LotLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LotLocks {
    async fn acquire(&self, lot_id: &str) -> LotGuard<'_> {
        let mut guard = LotGuard {
            locks: self,
            lot_id: lot_id.to_string(),
            held: None,
        };
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(lot_id.to_string()).or_default().clone()
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held append lock for one lot. Dropping it releases the mutex and removes
/// the map entry if nobody else holds a handle to it.
struct LotGuard<'a> {
    locks: &'a LotLocks,
    lot_id: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for LotGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut locks = self
            .locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.lot_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.lot_id);
        }
    }
}

pub struct EventLog<S: ?Sized> {
    store: Arc<S>,
    locks: LotLocks,
    clock: Clock,
}

impl<S: LotStore + ?Sized> EventLog<S> {
    pub fn new(store: Arc<S>) -> Self {
        EventLog {
            store,
            locks: LotLocks::default(),
            clock: Arc::new(utc_timestamp),
        }
    }

    /// Replace the default-timestamp source.
    pub fn with_clock(mut self, clock: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn find_lot(&self, lot_id: &str) -> Result<LotRecord, TraceError> {
        self.store
            .find_lot(lot_id)
            .await?
            .ok_or_else(|| TraceError::LotNotFound {
                lot_id: lot_id.to_string(),
            })
    }

    /// Create a lot and its `harvest_created` genesis event.
    ///
    /// If the genesis event cannot be stored the lot row is removed again,
    /// so a lot never exists without its first event.
    pub async fn create_lot(&self, lot: NewLot) -> Result<LotSummary, TraceError> {
        lot.validate()?;
        let payload = to_payload_value(&lot)?;
        {
            let _guard = self.locks.acquire(&lot.lot_id).await;
            let record = self.store.create_lot(lot.to_record()).await?;
            let timestamp = (self.clock)();
            if let Err(err) = self
                .append_locked(&record, EventKind::HarvestCreated, payload, timestamp)
                .await
            {
                if let Err(cleanup) = self.store.delete_lot(&lot.lot_id).await {
                    tracing::warn!(
                        lot = %lot.lot_id,
                        error = %cleanup,
                        "could not remove lot after failed genesis append"
                    );
                }
                return Err(err);
            }
            tracing::info!(lot = %lot.lot_id, crop = %lot.crop, "lot created");
        }
        self.summarize(&lot.lot_id).await
    }

    /// Append one event to a lot's chain.
    ///
    /// `payload` must serialize to a JSON object. When `timestamp` is `None`
    /// the clock supplies the current time.
    pub async fn append_event<T: Serialize + ?Sized>(
        &self,
        lot_id: &str,
        kind: EventKind,
        payload: &T,
        timestamp: Option<&str>,
    ) -> Result<ChainEvent, TraceError> {
        if kind.as_str().is_empty() {
            return Err(TraceError::InvalidPayload(
                "event kind must not be empty".to_string(),
            ));
        }
        let payload = to_payload_value(payload)?;
        if !payload.is_object() {
            return Err(TraceError::InvalidPayload(
                "payload must be a JSON object".to_string(),
            ));
        }
        let lot = self.find_lot(lot_id).await?;
        let _guard = self.locks.acquire(&lot.lot_id).await;
        let timestamp = match timestamp {
            Some(ts) => ts.to_string(),
            None => (self.clock)(),
        };
        self.append_locked(&lot, kind, payload, timestamp).await
    }

    /// Append a typed event body.
    pub async fn record(&self, body: EventPayload) -> Result<ChainEvent, TraceError> {
        let prepared = body.prepare()?;
        self.append_event(
            &prepared.lot_id,
            prepared.kind,
            &Value::Object(prepared.payload),
            prepared.timestamp.as_deref(),
        )
        .await
    }

    /// Caller must hold the lot's append lock.
    async fn append_locked(
        &self,
        lot: &LotRecord,
        kind: EventKind,
        payload: Value,
        timestamp: String,
    ) -> Result<ChainEvent, TraceError> {
        let prev_hash = match self.store.find_last_event(lot.id).await? {
            Some(last) => last.hash,
            None => GENESIS.to_string(),
        };
        let hash = compute_hash(&prev_hash, &payload, &timestamp);
        let record = self
            .store
            .append_event(NewEventRecord {
                lot: lot.id,
                kind: kind.as_str().to_string(),
                payload: to_canonical_string(&payload),
                timestamp,
                prev_hash,
                hash,
            })
            .await
            .map_err(|e| match e {
                StorageError::LotNotFound { .. } => TraceError::LotNotFound {
                    lot_id: lot.lot_id.clone(),
                },
                other => other.into(),
            })?;
        tracing::debug!(lot = %lot.lot_id, kind = %kind, seq = record.id, "event appended");
        Ok(ChainEvent {
            id: record.id,
            kind,
            payload,
            timestamp: record.timestamp,
            prev_hash: record.prev_hash,
            hash: record.hash,
        })
    }

    /// All events of a lot in ascending sequence order.
    pub async fn get_chain(&self, lot_id: &str) -> Result<Vec<ChainEvent>, TraceError> {
        let lot = self.find_lot(lot_id).await?;
        self.load_chain(&lot).await
    }

    async fn load_chain(&self, lot: &LotRecord) -> Result<Vec<ChainEvent>, TraceError> {
        let records = self.store.list_events(lot.id).await?;
        Ok(records.into_iter().map(ChainEvent::from_record).collect())
    }

    pub async fn summarize(&self, lot_id: &str) -> Result<LotSummary, TraceError> {
        let lot = self.find_lot(lot_id).await?;
        let chain = self.load_chain(&lot).await?;
        Ok(summarize_chain(lot, chain))
    }

    /// Integrity check without the derived summary.
    pub async fn verify(&self, lot_id: &str) -> Result<Verification, TraceError> {
        let lot = self.find_lot(lot_id).await?;
        let chain = self.load_chain(&lot).await?;
        let verified = verify_chain(chain.iter().map(ChainEvent::link));
        if !verified {
            tracing::warn!(lot = %lot.lot_id, events = chain.len(), "chain failed verification");
        }
        Ok(Verification {
            verified,
            event_count: chain.len(),
        })
    }

    /// Delete a lot and all of its events.
    pub async fn delete_lot(&self, lot_id: &str) -> Result<(), TraceError> {
        let _guard = self.locks.acquire(lot_id).await;
        self.store.delete_lot(lot_id).await?;
        tracing::info!(lot = %lot_id, "lot deleted");
        Ok(())
    }

    pub async fn list_lots(&self) -> Result<Vec<LotInfo>, TraceError> {
        let lots = self.store.list_lots().await?;
        Ok(lots.into_iter().map(LotInfo::from).collect())
    }
}

/// Build the summary of a loaded chain.
///
/// The latest temperature, humidity and pH are tracked per field: an event
/// that lacks a field keeps the last value seen for it. The quality score
/// uses only the last reading-bearing event.
pub fn summarize_chain(lot: LotRecord, chain: Vec<ChainEvent>) -> LotSummary {
    let verified = verify_chain(chain.iter().map(ChainEvent::link));
    if !verified {
        tracing::warn!(lot = %lot.lot_id, events = chain.len(), "chain failed verification");
    }

    let readings: Vec<Reading> = chain.iter().filter_map(ChainEvent::reading).collect();
    let mut latest = Reading::default();
    for r in &readings {
        latest.temperature_c = r.temperature_c.or(latest.temperature_c);
        latest.humidity_pct = r.humidity_pct.or(latest.humidity_pct);
        latest.ph = r.ph.or(latest.ph);
    }
    let quality_score = quality::score(&readings);

    LotSummary {
        lot_id: lot.lot_id,
        farm_name: lot.farm_name,
        crop: lot.crop,
        harvest_date: lot.harvest_date,
        total_events: chain.len(),
        verified,
        quality_score,
        spoilage_risk: quality::label(quality_score),
        latest_temperature_c: latest.temperature_c,
        latest_humidity_pct: latest.humidity_pct,
        latest_ph: latest.ph,
        chain,
    }
}
