use serde::{Deserialize, Serialize};

/// Lifecycle state of a logical backup that may cross several tapes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanningStatus {
    InProgress,
    Completed,
    Failed,
}

/// A logical backup job, stitched together from one or more `SpanningMember`s
/// when it outgrows a single tape's capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanningSet {
    pub id: u64,
    pub job_id: String,
    pub status: SpanningStatus,
    pub total_files: u64,
    pub total_bytes: u64,
}

/// One tape's contribution to a `SpanningSet`.
///
/// Invariant enforced by the spanning coordinator: the disjoint union of all
/// members' `[files_start_index, files_end_index)` ranges forms a contiguous
/// prefix `[0, N)`, and `sequence_number` is 1-based and dense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanningMember {
    pub spanning_set_id: u64,
    pub tape_id: u64,
    pub backup_set_id: u64,
    pub sequence_number: u32,
    pub bytes_written: u64,
    pub files_start_index: u64,
    pub files_end_index: u64,
}

impl SpanningMember {
    pub fn file_count(&self) -> u64 {
        self.files_end_index - self.files_start_index
    }
}
