use std::future::Future;

use super::{make_event, make_lot, TestResult};
use crate::{LotStore, StorageError};

pub(super) async fn run_cascade_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "cascade",
            "delete_removes_lot_and_events",
            delete_removes_lot_and_events(factory().await).await,
        ),
        TestResult::from_result(
            "cascade",
            "delete_leaves_other_lots_alone",
            delete_leaves_other_lots_alone(factory().await).await,
        ),
        TestResult::from_result(
            "cascade",
            "delete_unknown_lot_rejected",
            delete_unknown_lot_rejected(factory().await).await,
        ),
    ]
}

async fn delete_removes_lot_and_events<S: LotStore>(store: S) -> Result<(), String> {
    let lot = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create: {e}"))?;
    store
        .append_event(make_event(lot.id, "GENESIS", "h1"))
        .await
        .map_err(|e| format!("append: {e}"))?;
    store
        .delete_lot("LOT-A")
        .await
        .map_err(|e| format!("delete: {e}"))?;

    if store
        .find_lot("LOT-A")
        .await
        .map_err(|e| format!("find: {e}"))?
        .is_some()
    {
        return Err("lot still present after delete".to_string());
    }
    let events = store
        .list_events(lot.id)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !events.is_empty() {
        return Err(format!("{} events survived delete", events.len()));
    }

    // The business key is free again.
    store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("re-create: {e}"))?;
    Ok(())
}

async fn delete_leaves_other_lots_alone<S: LotStore>(store: S) -> Result<(), String> {
    let a = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create A: {e}"))?;
    let b = store
        .create_lot(make_lot("LOT-B"))
        .await
        .map_err(|e| format!("create B: {e}"))?;
    for lot in [a.id, b.id] {
        store
            .append_event(make_event(lot, "GENESIS", "h"))
            .await
            .map_err(|e| format!("append: {e}"))?;
    }
    store
        .delete_lot("LOT-A")
        .await
        .map_err(|e| format!("delete: {e}"))?;
    let events = store
        .list_events(b.id)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if events.len() != 1 {
        return Err(format!("LOT-B has {} events, expected 1", events.len()));
    }
    Ok(())
}

async fn delete_unknown_lot_rejected<S: LotStore>(store: S) -> Result<(), String> {
    match store.delete_lot("LOT-MISSING").await {
        Err(StorageError::LotNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected LotNotFound, got {e}")),
        Ok(()) => Err("delete of unknown lot succeeded".to_string()),
    }
}
