use serde::{Deserialize, Serialize};

use proxmox_uuid::Uuid;

/// Physical format of the data stream written to a tape.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapeFormat {
    /// Our own framed archive/label/TOC format (see the `Label & TOC` module).
    Raw,
    /// Linear Tape File System, read-only support for foreign media.
    Ltfs,
}

/// Lifecycle state of a tape. Transitions are validated by
/// `state::validate_transition` against the graph in the data model.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapeStatus {
    /// Never labeled, or relabeled after expiry.
    Blank,
    /// Labeled and currently receiving (or eligible to receive) writes.
    Active,
    /// No more capacity; only readable.
    Full,
    /// Retention window elapsed; eligible for relabel if the pool allows reuse.
    Expired,
    /// Permanently withdrawn from service by an operator.
    Retired,
    /// Physically removed from the library (offsite).
    Exported,
}

/// A single physical (or simulated) tape cartridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tape {
    pub id: u64,
    pub uuid: Uuid,
    pub barcode: Option<String>,
    pub label: String,
    pub pool_id: u64,
    pub status: TapeStatus,
    pub format: TapeFormat,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub write_count: u64,
    pub last_written_at: Option<i64>,
    pub labeled_at: Option<i64>,
}

impl Tape {
    pub fn new_blank(id: u64, uuid: Uuid, label: String, pool_id: u64, capacity_bytes: u64) -> Self {
        Self {
            id,
            uuid,
            barcode: None,
            label,
            pool_id,
            status: TapeStatus::Blank,
            format: TapeFormat::Raw,
            capacity_bytes,
            used_bytes: 0,
            write_count: 0,
            last_written_at: None,
            labeled_at: None,
        }
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }

    pub fn is_labeled(&self) -> bool {
        self.labeled_at.is_some()
    }
}
