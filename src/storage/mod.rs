pub mod gateway;
pub mod journal;
pub mod snapshot;
pub mod store;

pub use gateway::{MemoryGateway, PersistenceGateway};
pub use journal::{DurabilityMode, JournalGateway};
pub use snapshot::{DEFAULT_SNAPSHOT_FILE, render_json, save_snapshot};
pub use store::{SharedStore, StoreTable};
