use serde::{Deserialize, Serialize};

/// Metadata the Catalog keeps for one archived file, enough to restore it
/// without scanning the whole tape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub backup_set_id: u64,
    pub file_path: String,
    pub file_size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub checksum: [u8; 32],
    /// Absolute tape block at which the payload begins.
    pub block_offset: u64,
    pub file_number: u64,
}
