//! Tamper-evident event chains for farm produce lots.
//!
//! Each lot owns an append-only chain of events. Every event's hash covers
//! its predecessor's hash, its payload and its timestamp, so any edit to a
//! stored event is detected by recomputing the chain.
//!
//! - [`hash_chain`]: hashing and verification, pure functions
//! - [`quality`]: quality score and spoilage risk from the latest reading
//! - [`event_log`]: appends, chain loading, summaries over a [`LotStore`]
//!
//! [`LotStore`]: tracechain_storage::LotStore

pub mod canonical;
pub mod error;
pub mod event;
pub mod event_log;
pub mod hash_chain;
pub mod quality;

pub use error::TraceError;
pub use event::{
    ChainEvent, EventKind, EventPayload, GenericEvent, LotInfo, LotSummary, NewLot,
    SensorReading, TransportEvent, Verification,
};
pub use event_log::{summarize_chain, utc_timestamp, EventLog};
pub use hash_chain::{compute_hash, verify_chain, ChainLink, GENESIS};
pub use quality::{Reading, SpoilageRisk};

/// Crate version, reported by the server's health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
