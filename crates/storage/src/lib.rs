//! Persistence layer for foursight check and action results.
//!
//! Results are JSON documents kept in object storage under
//! `<prefix>/<name>/<uuid>.json`, with an empty companion marker
//! `<prefix>/<name>/<uuid>.primary` for runs made with `primary=true`.
//! The `latest`, `primary` and `closest` pointers are never stored; they
//! are projections computed from a key listing sorted by UUID.

mod error;
mod fs;
mod memory;
mod record;
mod results;
pub mod timestamp;
mod traits;

pub use error::StorageError;
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use record::{ActionRecord, ActionStatus, CheckRecord, CheckStatus, Kwargs, StoredRecord};
pub use results::{ResultStore, LAMBDA_MAX_BODY_SIZE};
pub use traits::{list_all_keys, ListPage, ObjectStore};
