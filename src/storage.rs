/// Filesystem storage, one YAML file per collaboration.
pub mod directory;
mod record;
mod store;

pub use directory::{Directory, InitError};
pub use record::{CollaborationRecord, InvalidRecord};
pub use store::{LoadError, MemoryStore, Store, StoreError};
