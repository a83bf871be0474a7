//! Demo data: one lettuce lot with readings from the farm and cold room.

use tracechain_core::{
    EventLog, EventPayload, NewLot, SensorReading, TraceError, TransportEvent,
};
use tracechain_storage::LotStore;

pub(crate) const DEMO_LOT: &str = "LOT-001";
const DEMO_FARM: &str = "Baan Mae Rim Farm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeedOutcome {
    /// The demo lot was already present; nothing was written.
    Exists,
    Seeded,
}

impl SeedOutcome {
    pub(crate) fn to_json(self) -> serde_json::Value {
        match self {
            SeedOutcome::Exists => serde_json::json!({"status": "exists"}),
            SeedOutcome::Seeded => serde_json::json!({"status": "seeded", "lot_id": DEMO_LOT}),
        }
    }
}

fn sensor(temperature_c: f64, humidity_pct: f64, soil_moisture_pct: f64, ph: f64) -> EventPayload {
    EventPayload::Sensor(SensorReading {
        lot_id: DEMO_LOT.to_string(),
        farm_name: DEMO_FARM.to_string(),
        temperature_c,
        humidity_pct,
        soil_moisture_pct,
        ph,
        timestamp: None,
    })
}

/// Create the demo lot unless it already exists.
pub(crate) async fn seed_demo<S: LotStore + ?Sized>(
    log: &EventLog<S>,
) -> Result<SeedOutcome, TraceError> {
    let lot = NewLot {
        lot_id: DEMO_LOT.to_string(),
        farm_name: DEMO_FARM.to_string(),
        farm_location: "Mae Rim, Chiang Mai".to_string(),
        crop: "Hydro Lettuce".to_string(),
        harvest_date: "2025-08-15".to_string(),
    };
    match log.create_lot(lot).await {
        Ok(_) => {}
        Err(TraceError::LotAlreadyExists { .. }) => return Ok(SeedOutcome::Exists),
        Err(e) => return Err(e),
    }

    log.record(sensor(12.5, 90.0, 35.0, 6.5)).await?;
    log.record(EventPayload::Transport(TransportEvent {
        lot_id: DEMO_LOT.to_string(),
        location: "Cold Room #1".to_string(),
        temperature_c: 10.5,
        humidity_pct: 88.0,
        note: None,
        timestamp: None,
    }))
    .await?;
    log.record(sensor(16.8, 80.0, 30.0, 6.6)).await?;

    tracing::info!(lot = DEMO_LOT, "demo data seeded");
    Ok(SeedOutcome::Seeded)
}
