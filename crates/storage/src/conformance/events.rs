use std::future::Future;

use super::{make_event, make_lot, TestResult};
use crate::{LotStore, StorageError};

pub(super) async fn run_event_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "events",
            "fresh_lot_has_no_last_event",
            fresh_lot_has_no_last_event(factory().await).await,
        ),
        TestResult::from_result(
            "events",
            "append_preserves_fields",
            append_preserves_fields(factory().await).await,
        ),
        TestResult::from_result(
            "events",
            "sequence_increases_across_lots",
            sequence_increases_across_lots(factory().await).await,
        ),
        TestResult::from_result(
            "events",
            "list_events_ascending_and_scoped",
            list_events_ascending_and_scoped(factory().await).await,
        ),
        TestResult::from_result(
            "events",
            "append_to_unknown_lot_rejected",
            append_to_unknown_lot_rejected(factory().await).await,
        ),
    ]
}

async fn fresh_lot_has_no_last_event<S: LotStore>(store: S) -> Result<(), String> {
    let lot = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create: {e}"))?;
    match store.find_last_event(lot.id).await {
        Ok(None) => Ok(()),
        Ok(Some(ev)) => Err(format!("unexpected event: {ev:?}")),
        Err(e) => Err(format!("find_last_event: {e}")),
    }
}

async fn append_preserves_fields<S: LotStore>(store: S) -> Result<(), String> {
    let lot = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create: {e}"))?;
    let appended = store
        .append_event(make_event(lot.id, "GENESIS", "h1"))
        .await
        .map_err(|e| format!("append: {e}"))?;
    if appended.lot != lot.id
        || appended.prev_hash != "GENESIS"
        || appended.hash != "h1"
        || appended.payload != r#"{"temperature_c": 12.5}"#
    {
        return Err(format!("fields not preserved: {appended:?}"));
    }
    let last = store
        .find_last_event(lot.id)
        .await
        .map_err(|e| format!("find_last_event: {e}"))?;
    if last.as_ref() != Some(&appended) {
        return Err(format!("last event {last:?} != appended {appended:?}"));
    }
    Ok(())
}

async fn sequence_increases_across_lots<S: LotStore>(store: S) -> Result<(), String> {
    let a = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create A: {e}"))?;
    let b = store
        .create_lot(make_lot("LOT-B"))
        .await
        .map_err(|e| format!("create B: {e}"))?;
    let mut last_id = i64::MIN;
    for (i, lot) in [a.id, b.id, a.id, b.id].into_iter().enumerate() {
        let ev = store
            .append_event(make_event(lot, "GENESIS", &format!("h{i}")))
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
        if ev.id <= last_id {
            return Err(format!("sequence {} not above {}", ev.id, last_id));
        }
        last_id = ev.id;
    }
    Ok(())
}

async fn list_events_ascending_and_scoped<S: LotStore>(store: S) -> Result<(), String> {
    let a = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create A: {e}"))?;
    let b = store
        .create_lot(make_lot("LOT-B"))
        .await
        .map_err(|e| format!("create B: {e}"))?;
    for i in 0..3 {
        store
            .append_event(make_event(a.id, "x", &format!("a{i}")))
            .await
            .map_err(|e| format!("append a{i}: {e}"))?;
        store
            .append_event(make_event(b.id, "x", &format!("b{i}")))
            .await
            .map_err(|e| format!("append b{i}: {e}"))?;
    }
    let events = store
        .list_events(a.id)
        .await
        .map_err(|e| format!("list: {e}"))?;
    let hashes: Vec<&str> = events.iter().map(|e| e.hash.as_str()).collect();
    if hashes != ["a0", "a1", "a2"] {
        return Err(format!("unexpected chain for LOT-A: {hashes:?}"));
    }
    if events.windows(2).any(|w| w[0].id >= w[1].id) {
        return Err("events not in ascending sequence order".to_string());
    }
    Ok(())
}

async fn append_to_unknown_lot_rejected<S: LotStore>(store: S) -> Result<(), String> {
    match store.append_event(make_event(4242, "GENESIS", "h")).await {
        Err(StorageError::LotNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected LotNotFound, got {e}")),
        Ok(r) => Err(format!("append to unknown lot succeeded: {r:?}")),
    }
}
