//! Shared data types for the tape library core and its collaborators.
//!
//! Nothing in this crate touches tape hardware or storage directly; it only
//! describes the entities the core and the Catalog collaborator exchange.

mod fingerprint;
pub use fingerprint::Fingerprint;

mod tape;
pub use tape::*;

mod pool;
pub use pool::*;

mod backup_set;
pub use backup_set::*;

mod spanning;
pub use spanning::*;

mod catalog_entry;
pub use catalog_entry::*;

mod encryption_key;
pub use encryption_key::*;

mod tape_change;
pub use tape_change::*;

pub use proxmox_uuid::Uuid;
