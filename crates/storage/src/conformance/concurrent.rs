use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use super::{make_event, make_lot, TestResult};
use crate::{LotStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_appends_all_recorded",
            concurrent_appends_all_recorded(factory().await).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_create_exactly_one_wins",
            concurrent_create_exactly_one_wins(factory().await).await,
        ),
    ]
}

/// N tasks append to the same lot in parallel. Every append must be
/// recorded exactly once with a distinct sequence position.
async fn concurrent_appends_all_recorded<S: LotStore>(store: S) -> Result<(), String> {
    let store = Arc::new(store);
    let lot = store
        .create_lot(make_lot("LOT-A"))
        .await
        .map_err(|e| format!("create: {e}"))?;
    let lot_id = lot.id;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            s.append_event(make_event(lot_id, "GENESIS", &format!("h{i}")))
                .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let events = store
        .list_events(lot_id)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if events.len() != N {
        return Err(format!("expected {N} events, found {}", events.len()));
    }
    let ids: HashSet<i64> = events.iter().map(|e| e.id).collect();
    if ids.len() != N {
        return Err("duplicate sequence positions".to_string());
    }
    Ok(())
}

/// N tasks race to create the same lot. Exactly one succeeds.
async fn concurrent_create_exactly_one_wins<S: LotStore>(store: S) -> Result<(), String> {
    let store = Arc::new(store);
    let mut handles = Vec::new();
    for _ in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            match s.create_lot(make_lot("LOT-A")).await {
                Ok(_) => Ok(true),
                Err(StorageError::LotAlreadyExists { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}
