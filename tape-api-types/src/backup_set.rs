use serde::{Deserialize, Serialize};

/// Whether a backup set is a self-contained full backup or layered on a parent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
}

/// Lifecycle state of one backup set (one file range on one tape).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One run's worth of archive data written to a single tape.
///
/// When a backup spans multiple tapes, each tape gets its own `BackupSet`,
/// linked by `parent_set_id` and tied together by a `SpanningSet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSet {
    pub id: u64,
    pub job_id: String,
    pub tape_id: u64,
    pub set_type: BackupType,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: SetStatus,
    pub file_count: u64,
    pub total_bytes: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub checksum: Option<[u8; 32]>,
    pub parent_set_id: Option<u64>,
    pub format: crate::TapeFormat,
    pub encrypted: bool,
    pub encryption_key_id: Option<u64>,
    pub compressed: bool,
}

impl BackupSet {
    /// A completed set must satisfy the invariant in the data model: a valid
    /// block range and a checksum over its TOC.
    pub fn is_well_formed_completed(&self) -> bool {
        self.status == SetStatus::Completed
            && self.end_block >= self.start_block
            && self.checksum.is_some()
    }
}
