use tracechain_storage::StorageError;

/// Errors raised by event log operations.
///
/// A chain that fails verification is not an error: it is reported as
/// `verified: false` in summaries and verification results.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The referenced lot business key has no persisted lot.
    #[error("lot not found: {lot_id}")]
    LotNotFound { lot_id: String },

    /// A lot with this business key already exists.
    #[error("lot already exists: {lot_id}")]
    LotAlreadyExists { lot_id: String },

    /// The payload cannot be brought into canonical form for hashing.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Lot attributes failed validation.
    #[error("invalid lot: {0}")]
    InvalidLot(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for TraceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::LotNotFound { lot } => TraceError::LotNotFound { lot_id: lot },
            StorageError::LotAlreadyExists { lot_id } => TraceError::LotAlreadyExists { lot_id },
            other => TraceError::Storage(other),
        }
    }
}
