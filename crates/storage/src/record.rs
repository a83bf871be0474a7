use serde::{Deserialize, Serialize};

/// A persisted lot as stored in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRecord {
    /// Store-assigned internal id.
    pub id: i64,
    /// Business key, unique across the store.
    pub lot_id: String,
    pub farm_name: String,
    pub farm_location: String,
    pub crop: String,
    /// Calendar date string (YYYY-MM-DD).
    pub harvest_date: String,
}

/// Attributes for a lot that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLotRecord {
    pub lot_id: String,
    pub farm_name: String,
    pub farm_location: String,
    pub crop: String,
    pub harvest_date: String,
}

/// A persisted chain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Store-assigned sequence position. Only used for ordering.
    pub id: i64,
    /// Internal id of the owning lot.
    pub lot: i64,
    pub kind: String,
    /// JSON-encoded payload, exactly as it was hashed.
    pub payload: String,
    /// ISO 8601 timestamp string.
    pub timestamp: String,
    pub prev_hash: String,
    pub hash: String,
}

/// An event ready to be appended; the store assigns the sequence position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEventRecord {
    pub lot: i64,
    pub kind: String,
    pub payload: String,
    pub timestamp: String,
    pub prev_hash: String,
    pub hash: String,
}

impl NewEventRecord {
    pub(crate) fn into_record(self, id: i64) -> EventRecord {
        EventRecord {
            id,
            lot: self.lot,
            kind: self.kind,
            payload: self.payload,
            timestamp: self.timestamp,
            prev_hash: self.prev_hash,
            hash: self.hash,
        }
    }
}

impl NewLotRecord {
    pub(crate) fn into_record(self, id: i64) -> LotRecord {
        LotRecord {
            id,
            lot_id: self.lot_id,
            farm_name: self.farm_name,
            farm_location: self.farm_location,
            crop: self.crop,
            harvest_date: self.harvest_date,
        }
    }
}
