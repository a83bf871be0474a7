//! End-to-end chain behaviour over real and instrumented stores.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracechain_core::{
    EventKind, EventLog, EventPayload, NewLot, SensorReading, SpoilageRisk, TraceError,
    TransportEvent, GENESIS,
};
use tracechain_storage::{
    EventRecord, LotRecord, LotStore, MemoryStore, NewEventRecord, NewLotRecord, StorageError,
};

fn new_lot(key: &str) -> NewLot {
    NewLot {
        lot_id: key.to_string(),
        farm_name: "Baan Mae Rim Farm".to_string(),
        farm_location: "Mae Rim, Chiang Mai".to_string(),
        crop: "Hydro Lettuce".to_string(),
        harvest_date: "2025-08-15".to_string(),
    }
}

/// How `append_event` should fail when a fault is set.
#[derive(Clone, Copy)]
enum AppendFault {
    Backend,
    /// The store lost the lot between lookup and append.
    MissingLot,
}

/// Delegates to a `MemoryStore`, but lets tests overwrite stored events,
/// fail appends, and slow down the last-event lookup to widen race windows.
#[derive(Default)]
struct InstrumentedStore {
    inner: MemoryStore,
    overrides: Mutex<HashMap<i64, EventRecord>>,
    append_fault: Mutex<Option<AppendFault>>,
    lookup_delay: Option<Duration>,
}

impl InstrumentedStore {
    fn slow(delay: Duration) -> Self {
        InstrumentedStore {
            lookup_delay: Some(delay),
            ..Default::default()
        }
    }

    fn tamper(&self, record: EventRecord) {
        self.overrides.lock().unwrap().insert(record.id, record);
    }

    fn fail_appends(&self, fault: Option<AppendFault>) {
        *self.append_fault.lock().unwrap() = fault;
    }
}

#[async_trait]
impl LotStore for InstrumentedStore {
    async fn find_lot(&self, lot_id: &str) -> Result<Option<LotRecord>, StorageError> {
        self.inner.find_lot(lot_id).await
    }

    async fn create_lot(&self, lot: NewLotRecord) -> Result<LotRecord, StorageError> {
        self.inner.create_lot(lot).await
    }

    async fn list_lots(&self) -> Result<Vec<LotRecord>, StorageError> {
        self.inner.list_lots().await
    }

    async fn delete_lot(&self, lot_id: &str) -> Result<(), StorageError> {
        self.inner.delete_lot(lot_id).await
    }

    async fn find_last_event(&self, lot: i64) -> Result<Option<EventRecord>, StorageError> {
        let last = self.inner.find_last_event(lot).await;
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        last
    }

    async fn append_event(&self, record: NewEventRecord) -> Result<EventRecord, StorageError> {
        let fault = *self.append_fault.lock().unwrap();
        match fault {
            Some(AppendFault::Backend) => Err(StorageError::Backend("disk full".into())),
            Some(AppendFault::MissingLot) => Err(StorageError::LotNotFound {
                lot: format!("#{}", record.lot),
            }),
            None => self.inner.append_event(record).await,
        }
    }

    async fn list_events(&self, lot: i64) -> Result<Vec<EventRecord>, StorageError> {
        let overrides = self.overrides.lock().unwrap().clone();
        Ok(self
            .inner
            .list_events(lot)
            .await?
            .into_iter()
            .map(|e| overrides.get(&e.id).cloned().unwrap_or(e))
            .collect())
    }
}

#[tokio::test]
async fn sensor_then_transport_scenario() {
    let log = EventLog::new(Arc::new(MemoryStore::new()));
    log.create_lot(new_lot("LOT-X")).await.unwrap();

    log.record(EventPayload::Sensor(SensorReading {
        lot_id: "LOT-X".into(),
        farm_name: "Baan Mae Rim Farm".into(),
        temperature_c: 12.0,
        humidity_pct: 90.0,
        soil_moisture_pct: 30.0,
        ph: 6.5,
        timestamp: None,
    }))
    .await
    .unwrap();
    log.record(EventPayload::Transport(TransportEvent {
        lot_id: "LOT-X".into(),
        location: "Truck CM-102".into(),
        temperature_c: 25.0,
        humidity_pct: 40.0,
        note: None,
        timestamp: None,
    }))
    .await
    .unwrap();

    let summary = log.summarize("LOT-X").await.unwrap();
    assert!(summary.verified);
    assert_eq!(summary.total_events, 3);
    assert_eq!(summary.latest_temperature_c, Some(25.0));
    assert_eq!(summary.latest_humidity_pct, Some(40.0));
    assert_eq!(summary.latest_ph, Some(6.5));
    // (25 - 15) * 1.2 + (85 - 40) * 1.5; soil moisture and pH are absent in transit.
    assert_eq!(summary.quality_score, 20.5);
    assert_eq!(summary.spoilage_risk, SpoilageRisk::High);

    let kinds: Vec<&str> = summary.chain.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, ["harvest_created", "sensor_reading", "transported"]);
    assert_eq!(summary.chain[0].prev_hash, GENESIS);
    assert_eq!(summary.chain[1].prev_hash, summary.chain[0].hash);
    assert_eq!(summary.chain[2].prev_hash, summary.chain[1].hash);

    let verification = log.verify("LOT-X").await.unwrap();
    assert!(verification.verified);
    assert_eq!(verification.event_count, 3);
}

#[tokio::test]
async fn tampering_any_stored_field_is_detected() {
    type Mutation = fn(&mut EventRecord);
    let mutations: [(&str, Mutation); 4] = [
        ("payload", |e| e.payload = r#"{"temperature_c": 1.0}"#.into()),
        ("timestamp", |e| e.timestamp = "2030-01-01T00:00:00".into()),
        ("hash", |e| e.hash = "0".repeat(64)),
        ("prev_hash", |e| e.prev_hash = GENESIS.into()),
    ];

    for (field, mutate) in mutations {
        for target in 0..3 {
            let store = Arc::new(InstrumentedStore::default());
            let log = EventLog::new(store.clone());
            log.create_lot(new_lot("LOT-T")).await.unwrap();
            for t in [11.0, 13.0] {
                log.append_event(
                    "LOT-T",
                    EventKind::SensorReading,
                    &json!({"temperature_c": t}),
                    None,
                )
                .await
                .unwrap();
            }
            assert!(log.verify("LOT-T").await.unwrap().verified);

            let lot = store.find_lot("LOT-T").await.unwrap().unwrap();
            let mut record = store.inner.list_events(lot.id).await.unwrap()[target].clone();
            let original = record.clone();
            mutate(&mut record);
            if record == original {
                // prev_hash of the genesis event is already GENESIS.
                continue;
            }
            store.tamper(record);

            let verification = log.verify("LOT-T").await.unwrap();
            assert!(!verification.verified, "{field} of event {target}");
            assert_eq!(verification.event_count, 3);
            assert!(!log.summarize("LOT-T").await.unwrap().verified);
        }
    }
}

#[tokio::test]
async fn full_precision_floats_verify_after_reload() {
    let log = EventLog::new(Arc::new(MemoryStore::new()))
        .with_clock(|| "2025-08-15T06:00:00".to_string());
    log.create_lot(new_lot("LOT-F")).await.unwrap();
    let payload = json!({"temperature_c": 12.643588362616335, "humidity_pct": 0.1 + 0.2});
    let appended = log
        .append_event("LOT-F", EventKind::SensorReading, &payload, None)
        .await
        .unwrap();

    let chain = log.get_chain("LOT-F").await.unwrap();
    assert_eq!(chain[1].payload, payload);
    assert_eq!(chain[1].hash, appended.hash);
    assert!(log.verify("LOT-F").await.unwrap().verified);
    assert_eq!(log.summarize("LOT-F").await.unwrap().latest_humidity_pct, Some(0.1 + 0.2));
}

#[tokio::test]
async fn failed_genesis_append_removes_the_lot() {
    let store = Arc::new(InstrumentedStore::default());
    let log = EventLog::new(store.clone());
    store.fail_appends(Some(AppendFault::Backend));

    assert!(matches!(
        log.create_lot(new_lot("LOT-G")).await,
        Err(TraceError::Storage(StorageError::Backend(_)))
    ));
    assert!(store.find_lot("LOT-G").await.unwrap().is_none());
    assert!(log.list_lots().await.unwrap().is_empty());

    store.fail_appends(None);
    let summary = log.create_lot(new_lot("LOT-G")).await.unwrap();
    assert_eq!(summary.total_events, 1);
    assert_eq!(summary.chain[0].prev_hash, GENESIS);
}

#[tokio::test]
async fn lot_vanishing_mid_append_reports_business_key() {
    let store = Arc::new(InstrumentedStore::default());
    let log = EventLog::new(store.clone());
    log.create_lot(new_lot("LOT-V")).await.unwrap();
    store.fail_appends(Some(AppendFault::MissingLot));

    match log
        .append_event("LOT-V", EventKind::SensorReading, &json!({}), None)
        .await
    {
        Err(TraceError::LotNotFound { lot_id }) => assert_eq!(lot_id, "LOT-V"),
        other => panic!("expected lot not found, got {other:?}"),
    }
}

#[tokio::test]
async fn unparsable_stored_payload_fails_verification() {
    let store = Arc::new(InstrumentedStore::default());
    let log = EventLog::new(store.clone());
    log.create_lot(new_lot("LOT-T")).await.unwrap();
    let lot = store.find_lot("LOT-T").await.unwrap().unwrap();
    let mut record = store.inner.list_events(lot.id).await.unwrap()[0].clone();
    record.payload = "{not json".into();
    store.tamper(record);

    let summary = log.summarize("LOT-T").await.unwrap();
    assert!(!summary.verified);
    assert_eq!(summary.total_events, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_keep_one_linear_chain() {
    const N: usize = 16;
    let store = Arc::new(InstrumentedStore::slow(Duration::from_millis(5)));
    let log = Arc::new(EventLog::new(store));
    log.create_lot(new_lot("LOT-C")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..N {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            log.append_event(
                "LOT-C",
                EventKind::SensorReading,
                &json!({"temperature_c": i}),
                None,
            )
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let chain = log.get_chain("LOT-C").await.unwrap();
    assert_eq!(chain.len(), N + 1);
    for pair in chain.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
    }
    assert!(log.verify("LOT-C").await.unwrap().verified);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn appends_to_different_lots_do_not_interfere() {
    let log = Arc::new(EventLog::new(Arc::new(InstrumentedStore::slow(
        Duration::from_millis(2),
    ))));
    for key in ["LOT-A", "LOT-B"] {
        log.create_lot(new_lot(key)).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..10 {
        let log = log.clone();
        let key = if i % 2 == 0 { "LOT-A" } else { "LOT-B" };
        handles.push(tokio::spawn(async move {
            log.append_event(key, EventKind::Transported, &json!({"leg": i}), None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for key in ["LOT-A", "LOT-B"] {
        let v = log.verify(key).await.unwrap();
        assert!(v.verified, "{key}");
        assert_eq!(v.event_count, 6);
    }
}

#[tokio::test]
async fn event_log_works_over_a_trait_object() {
    let store: Arc<dyn LotStore> = Arc::new(MemoryStore::new());
    let log: EventLog<dyn LotStore> = EventLog::new(store);
    log.create_lot(new_lot("LOT-D")).await.unwrap();
    assert_eq!(log.list_lots().await.unwrap()[0].lot_id, "LOT-D");
}
