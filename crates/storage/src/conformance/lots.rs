use std::future::Future;

use super::{make_lot, TestResult};
use crate::{LotStore, StorageError};

pub(super) async fn run_lot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "lots",
            "create_then_find_returns_same_record",
            create_then_find_returns_same_record(factory().await).await,
        ),
        TestResult::from_result(
            "lots",
            "duplicate_lot_rejected",
            duplicate_lot_rejected(factory().await).await,
        ),
        TestResult::from_result(
            "lots",
            "unknown_lot_is_none",
            unknown_lot_is_none(factory().await).await,
        ),
        TestResult::from_result(
            "lots",
            "list_lots_in_creation_order",
            list_lots_in_creation_order(factory().await).await,
        ),
    ]
}

async fn create_then_find_returns_same_record<S: LotStore>(store: S) -> Result<(), String> {
    let created = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create: {e}"))?;
    let found = store
        .find_lot("LOT-A")
        .await
        .map_err(|e| format!("find: {e}"))?
        .ok_or("created lot not found")?;
    if found != created {
        return Err(format!("found {found:?}, created {created:?}"));
    }
    if found.crop != "Hydro Lettuce" || found.harvest_date != "2025-08-15" {
        return Err(format!("attributes not preserved: {found:?}"));
    }
    Ok(())
}

async fn duplicate_lot_rejected<S: LotStore>(store: S) -> Result<(), String> {
    store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("first create: {e}"))?;
    match store.create_lot(make_lot("LOT-A")).await {
        Err(StorageError::LotAlreadyExists { lot_id }) if lot_id == "LOT-A" => Ok(()),
        Err(e) => Err(format!("expected LotAlreadyExists, got {e}")),
        Ok(r) => Err(format!("duplicate create succeeded: {r:?}")),
    }
}

async fn unknown_lot_is_none<S: LotStore>(store: S) -> Result<(), String> {
    match store.find_lot("LOT-MISSING").await {
        Ok(None) => Ok(()),
        Ok(Some(r)) => Err(format!("unexpected lot: {r:?}")),
        Err(e) => Err(format!("find errored: {e}")),
    }
}

async fn list_lots_in_creation_order<S: LotStore>(store: S) -> Result<(), String> {
    for key in ["LOT-C", "LOT-A", "LOT-B"] {
        store
            .create_lot(make_lot(key))
            .await
            .map_err(|e| format!("create {key}: {e}"))?;
    }
    let keys: Vec<String> = store
        .list_lots()
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|l| l.lot_id)
        .collect();
    if keys != ["LOT-C", "LOT-A", "LOT-B"] {
        return Err(format!("unexpected order: {keys:?}"));
    }
    Ok(())
}
