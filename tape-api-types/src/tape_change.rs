use serde::{Deserialize, Serialize};

use proxmox_uuid::Uuid;

/// Why the spanning coordinator asked for a tape change.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapeChangeReason {
    TapeFull,
    TapeError,
}

/// Lifecycle state of an operator tape-change request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapeChangeStatus {
    Pending,
    Acknowledged,
    Completed,
    Cancelled,
}

/// Message the spanning coordinator publishes when it needs an operator (or
/// an automated changer) to mount a new tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapeChangeRequest {
    pub id: u64,
    pub spanning_set_id: u64,
    pub current_tape_id: u64,
    pub reason: TapeChangeReason,
    pub status: TapeChangeStatus,
    pub new_tape_uuid: Option<Uuid>,
}
