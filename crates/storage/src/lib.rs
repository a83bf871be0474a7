pub mod conformance;
mod error;
mod journal;
mod memory;
mod record;
mod state;
mod traits;

pub use error::StorageError;
pub use journal::JournalStore;
pub use memory::MemoryStore;
pub use record::{EventRecord, LotRecord, NewEventRecord, NewLotRecord};
pub use traits::LotStore;
