//! Deterministic event hashing and chain verification.
//!
//! An event hash is the lowercase hex SHA-256 of the canonical encoding of
//! `{"payload": ..., "prev_hash": ..., "timestamp": ...}`. Nothing else
//! (sequence position, event kind, lot identity) enters the hash.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::canonical::to_canonical_string;
use crate::error::TraceError;

/// `prev_hash` of the first event in every lot's chain.
pub const GENESIS: &str = "GENESIS";

/// Compute the hash of one event from its predecessor's hash, payload and
/// timestamp.
pub fn compute_hash(prev_hash: &str, payload: &Value, timestamp: &str) -> String {
    let mut block = Map::new();
    block.insert("prev_hash".to_string(), Value::String(prev_hash.to_string()));
    block.insert("payload".to_string(), payload.clone());
    block.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
    let canonical = to_canonical_string(&Value::Object(block));
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Convert any serializable payload to its JSON form for hashing.
///
/// Fails with `InvalidPayload` when serialization fails, for example a map
/// with non-string keys.
pub fn to_payload_value<T: Serialize + ?Sized>(payload: &T) -> Result<Value, TraceError> {
    serde_json::to_value(payload).map_err(|e| TraceError::InvalidPayload(e.to_string()))
}

/// [`compute_hash`] over any serializable payload.
pub fn hash_payload<T: Serialize + ?Sized>(
    prev_hash: &str,
    payload: &T,
    timestamp: &str,
) -> Result<String, TraceError> {
    Ok(compute_hash(prev_hash, &to_payload_value(payload)?, timestamp))
}

/// The fields of a stored event that verification looks at.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink<'a> {
    pub payload: &'a Value,
    pub timestamp: &'a str,
    pub prev_hash: &'a str,
    pub hash: &'a str,
}

/// Walk the links in order and check every hash and back-reference.
///
/// Returns false at the first event whose stored hash differs from the
/// recomputed one or whose `prev_hash` is not the previous event's hash.
/// An empty chain is valid.
pub fn verify_chain<'a, I>(links: I) -> bool
where
    I: IntoIterator<Item = ChainLink<'a>>,
{
    let mut expected_prev = GENESIS;
    for link in links {
        let recomputed = compute_hash(expected_prev, link.payload, link.timestamp);
        if link.hash != recomputed || link.prev_hash != expected_prev {
            return false;
        }
        expected_prev = link.hash;
    }
    true
}
