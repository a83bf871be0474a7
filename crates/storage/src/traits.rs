use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{EventRecord, LotRecord, NewEventRecord, NewLotRecord};

/// The storage trait for tracechain persistence backends.
///
/// A `LotStore` provides durable storage for lots and their hash-linked
/// events. It knows nothing about hashing: the event log computes every
/// hash and hands the store finished records.
///
/// ## Sequence positions
///
/// `append_event` assigns each event a sequence position that is strictly
/// greater than every position assigned before it, across all lots.
/// Positions order a lot's chain and are never part of a hash.
///
/// ## Atomicity
///
/// A record returned from `append_event` or visible through `list_events`
/// is fully written. The store does not serialize the read-then-append
/// sequence of a single lot; callers that need that (the event log does)
/// hold their own per-lot lock across `find_last_event` and `append_event`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared through
/// axum application state and across async task boundaries.
#[async_trait]
pub trait LotStore: Send + Sync + 'static {
    // ── Lots ──────────────────────────────────────────────────────────────────

    /// Look up a lot by business key.
    async fn find_lot(&self, lot_id: &str) -> Result<Option<LotRecord>, StorageError>;

    /// Persist a new lot.
    ///
    /// Returns `Err(StorageError::LotAlreadyExists)` if the business key is taken.
    async fn create_lot(&self, lot: NewLotRecord) -> Result<LotRecord, StorageError>;

    /// All lots, in creation order.
    async fn list_lots(&self) -> Result<Vec<LotRecord>, StorageError>;

    /// Delete a lot and every event it owns.
    ///
    /// Returns `Err(StorageError::LotNotFound)` if the business key is unknown.
    async fn delete_lot(&self, lot_id: &str) -> Result<(), StorageError>;

    // ── Events ────────────────────────────────────────────────────────────────

    /// The most recently appended event for a lot, if any.
    async fn find_last_event(&self, lot: i64) -> Result<Option<EventRecord>, StorageError>;

    /// Append an event record and return it with its assigned sequence position.
    ///
    /// Returns `Err(StorageError::LotNotFound)` if `record.lot` is unknown.
    async fn append_event(&self, record: NewEventRecord) -> Result<EventRecord, StorageError>;

    /// Every event for a lot in ascending sequence order.
    async fn list_events(&self, lot: i64) -> Result<Vec<EventRecord>, StorageError>;
}
