//! Conformance test suite for `LotStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `LotStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Lots**: creation, duplicate detection, lookup, listing order
//! - **Events**: sequence assignment, last-event lookup, ascending listing
//! - **Cascade**: deleting a lot removes its events and frees its key
//! - **Concurrency**: parallel appends across tasks never lose a record
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use tracechain_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod cascade;
mod concurrent;
mod events;
mod lots;

use std::fmt;
use std::future::Future;

use crate::record::{NewEventRecord, NewLotRecord};
use crate::LotStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "lots", "events").
    pub category: String,
    /// Test name (e.g. "duplicate_lot_rejected").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: LotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(lots::run_lot_tests(&factory).await);
    results.extend(events::run_event_tests(&factory).await);
    results.extend(cascade::run_cascade_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_lot(lot_id: &str) -> NewLotRecord {
    NewLotRecord {
        lot_id: lot_id.to_string(),
        farm_name: "Test Farm".to_string(),
        farm_location: "Test Valley".to_string(),
        crop: "Hydro Lettuce".to_string(),
        harvest_date: "2025-08-15".to_string(),
    }
}

fn make_event(lot: i64, prev_hash: &str, hash: &str) -> NewEventRecord {
    NewEventRecord {
        lot,
        kind: "sensor_reading".to_string(),
        payload: r#"{"temperature_c": 12.5}"#.to_string(),
        timestamp: "2025-08-15T08:00:00".to_string(),
        prev_hash: prev_hash.to_string(),
        hash: hash.to_string(),
    }
}
