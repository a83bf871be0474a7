//! Event kinds, typed request bodies, and the shapes returned to callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Iso8601;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracechain_storage::{EventRecord, LotRecord, NewLotRecord};

use crate::error::TraceError;
use crate::hash_chain::ChainLink;
use crate::quality::{Reading, SpoilageRisk};

/// Allowed length of a lot business key, in characters.
pub const LOT_ID_MIN_LEN: usize = 3;
pub const LOT_ID_MAX_LEN: usize = 64;

/// The kind of an event. Anything outside the built-in kinds is `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    HarvestCreated,
    SensorReading,
    Transported,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::HarvestCreated => "harvest_created",
            EventKind::SensorReading => "sensor_reading",
            EventKind::Transported => "transported",
            EventKind::Custom(kind) => kind,
        }
    }

    /// Whether events of this kind carry environmental readings.
    pub fn carries_readings(&self) -> bool {
        matches!(self, EventKind::SensorReading | EventKind::Transported)
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        match kind {
            "harvest_created" => EventKind::HarvestCreated,
            "sensor_reading" => EventKind::SensorReading,
            "transported" => EventKind::Transported,
            other => EventKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        Ok(EventKind::from(kind.as_str()))
    }
}

// ── Request bodies ───────────────────────────────────────────────────────────

/// Body for creating a lot. Also the payload of its `harvest_created` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLot {
    pub lot_id: String,
    pub farm_name: String,
    pub farm_location: String,
    pub crop: String,
    /// YYYY-MM-DD
    pub harvest_date: String,
}

impl NewLot {
    pub fn validate(&self) -> Result<(), TraceError> {
        let len = self.lot_id.chars().count();
        if !(LOT_ID_MIN_LEN..=LOT_ID_MAX_LEN).contains(&len) {
            return Err(TraceError::InvalidLot(format!(
                "lot_id must be {LOT_ID_MIN_LEN}-{LOT_ID_MAX_LEN} characters, got {len}"
            )));
        }
        Ok(())
    }

    pub(crate) fn to_record(&self) -> NewLotRecord {
        NewLotRecord {
            lot_id: self.lot_id.clone(),
            farm_name: self.farm_name.clone(),
            farm_location: self.farm_location.clone(),
            crop: self.crop.clone(),
            harvest_date: self.harvest_date.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub lot_id: String,
    pub farm_name: String,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub soil_moisture_pct: f64,
    pub ph: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEvent {
    pub lot_id: String,
    pub location: String,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericEvent {
    pub lot_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A typed event body, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Sensor(SensorReading),
    Transport(TransportEvent),
    Generic(GenericEvent),
}

/// An event body reduced to what the chain stores.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedEvent {
    pub lot_id: String,
    pub kind: EventKind,
    pub payload: Map<String, Value>,
    pub timestamp: Option<String>,
}

impl EventPayload {
    pub fn lot_id(&self) -> &str {
        match self {
            EventPayload::Sensor(b) => &b.lot_id,
            EventPayload::Transport(b) => &b.lot_id,
            EventPayload::Generic(b) => &b.lot_id,
        }
    }

    /// Validate the body and build the payload object that gets hashed.
    pub fn prepare(self) -> Result<PreparedEvent, TraceError> {
        match self {
            EventPayload::Sensor(b) => {
                check_finite(&[
                    ("temperature_c", b.temperature_c),
                    ("humidity_pct", b.humidity_pct),
                    ("soil_moisture_pct", b.soil_moisture_pct),
                    ("ph", b.ph),
                ])?;
                check_timestamp(b.timestamp.as_deref())?;
                let mut payload = Map::new();
                payload.insert("farm_name".into(), Value::String(b.farm_name));
                payload.insert("temperature_c".into(), number(b.temperature_c));
                payload.insert("humidity_pct".into(), number(b.humidity_pct));
                payload.insert("soil_moisture_pct".into(), number(b.soil_moisture_pct));
                payload.insert("ph".into(), number(b.ph));
                Ok(PreparedEvent {
                    lot_id: b.lot_id,
                    kind: EventKind::SensorReading,
                    payload,
                    timestamp: b.timestamp,
                })
            }
            EventPayload::Transport(b) => {
                check_finite(&[
                    ("temperature_c", b.temperature_c),
                    ("humidity_pct", b.humidity_pct),
                ])?;
                check_timestamp(b.timestamp.as_deref())?;
                let mut payload = Map::new();
                payload.insert("location".into(), Value::String(b.location));
                payload.insert("temperature_c".into(), number(b.temperature_c));
                payload.insert("humidity_pct".into(), number(b.humidity_pct));
                payload.insert("note".into(), b.note.map_or(Value::Null, Value::String));
                Ok(PreparedEvent {
                    lot_id: b.lot_id,
                    kind: EventKind::Transported,
                    payload,
                    timestamp: b.timestamp,
                })
            }
            EventPayload::Generic(b) => {
                if b.kind.trim().is_empty() {
                    return Err(TraceError::InvalidPayload(
                        "event type must not be empty".to_string(),
                    ));
                }
                check_timestamp(b.timestamp.as_deref())?;
                Ok(PreparedEvent {
                    lot_id: b.lot_id,
                    kind: EventKind::from(b.kind.as_str()),
                    payload: b.data,
                    timestamp: b.timestamp,
                })
            }
        }
    }
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn check_finite(fields: &[(&str, f64)]) -> Result<(), TraceError> {
    for (name, v) in fields {
        if !v.is_finite() {
            return Err(TraceError::InvalidPayload(format!(
                "{name} must be a finite number"
            )));
        }
    }
    Ok(())
}

/// Accept ISO 8601 date-times with or without a UTC offset.
pub fn check_timestamp(timestamp: Option<&str>) -> Result<(), TraceError> {
    let Some(ts) = timestamp else {
        return Ok(());
    };
    let parses = OffsetDateTime::parse(ts, &Iso8601::DEFAULT).is_ok()
        || PrimitiveDateTime::parse(ts, &Iso8601::DEFAULT).is_ok();
    if parses {
        Ok(())
    } else {
        Err(TraceError::InvalidPayload(format!(
            "timestamp is not ISO 8601: {ts}"
        )))
    }
}

// ── Chain views ──────────────────────────────────────────────────────────────

/// A stored event with its payload decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainEvent {
    /// Sequence position.
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: Value,
    pub timestamp: String,
    pub prev_hash: String,
    pub hash: String,
}

impl ChainEvent {
    /// Decode a stored record. A payload that is not valid JSON is kept as
    /// its raw string so that verification fails instead of erroring.
    pub fn from_record(record: EventRecord) -> Self {
        let payload = match serde_json::from_str(&record.payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(event = record.id, error = %e, "stored payload is not valid JSON");
                Value::String(record.payload)
            }
        };
        ChainEvent {
            id: record.id,
            kind: EventKind::from(record.kind.as_str()),
            payload,
            timestamp: record.timestamp,
            prev_hash: record.prev_hash,
            hash: record.hash,
        }
    }

    pub fn link(&self) -> ChainLink<'_> {
        ChainLink {
            payload: &self.payload,
            timestamp: &self.timestamp,
            prev_hash: &self.prev_hash,
            hash: &self.hash,
        }
    }

    /// Environmental readings in this event, if its kind carries any.
    ///
    /// A field is present only when the payload has it as a non-null number.
    pub fn reading(&self) -> Option<Reading> {
        if !self.kind.carries_readings() {
            return None;
        }
        let field = |key: &str| self.payload.get(key).and_then(Value::as_f64);
        Some(Reading {
            temperature_c: field("temperature_c"),
            humidity_pct: field("humidity_pct"),
            soil_moisture_pct: field("soil_moisture_pct"),
            ph: field("ph"),
        })
    }
}

/// Derived view of a lot and its chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotSummary {
    pub lot_id: String,
    pub farm_name: String,
    pub crop: String,
    pub harvest_date: String,
    pub total_events: usize,
    pub verified: bool,
    pub quality_score: f64,
    pub spoilage_risk: SpoilageRisk,
    pub latest_temperature_c: Option<f64>,
    pub latest_humidity_pct: Option<f64>,
    pub latest_ph: Option<f64>,
    pub chain: Vec<ChainEvent>,
}

/// Result of an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    #[serde(rename = "events")]
    pub event_count: usize,
}

/// A lot's attributes without its chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotInfo {
    pub lot_id: String,
    pub farm_name: String,
    pub farm_location: String,
    pub crop: String,
    pub harvest_date: String,
}

impl From<LotRecord> for LotInfo {
    fn from(r: LotRecord) -> Self {
        LotInfo {
            lot_id: r.lot_id,
            farm_name: r.farm_name,
            farm_location: r.farm_location,
            crop: r.crop,
            harvest_date: r.harvest_date,
        }
    }
}
