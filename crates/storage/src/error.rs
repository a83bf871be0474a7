/// All errors that can be returned by a LotStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No lot with the given business key or internal id.
    #[error("lot not found: {lot}")]
    LotNotFound { lot: String },

    /// A lot with this business key already exists.
    #[error("lot already exists: {lot_id}")]
    LotAlreadyExists { lot_id: String },

    /// A backend-specific storage error (poisoned lock, corrupt journal, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// I/O failure reading or writing a durable backend.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn lot_id_not_found(id: i64) -> Self {
        StorageError::LotNotFound {
            lot: format!("#{id}"),
        }
    }
}
