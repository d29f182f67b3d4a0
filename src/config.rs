//! Configuration knobs for a run.
//!
//! Loading this from a config file is the external configuration loader's
//! job (out of scope); the core only needs the resolved struct.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tunables for a single backup or restore run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// All device writes/reads are multiples of this many bytes.
    pub block_size: usize,
    /// Total bytes buffered across the Reader->Encoder->Writer queues.
    pub buffer_depth_mb: usize,
    pub write_retries: u32,
    pub read_retries: u32,
    pub verify_after_write: bool,
    pub operator_timeout_seconds: u64,
    pub default_device: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            block_size: 1024 * 1024,
            buffer_depth_mb: 64,
            write_retries: 3,
            read_retries: 3,
            verify_after_write: true,
            operator_timeout_seconds: 3600,
            default_device: PathBuf::from("/dev/nst0"),
        }
    }
}

impl RunConfig {
    /// Number of blocks that fit in the configured buffer depth, used to
    /// size the bounded inter-stage channels. Always at least 2 so the
    /// pipeline can make progress.
    pub fn queue_depth_blocks(&self) -> usize {
        let bytes = self.buffer_depth_mb.saturating_mul(1024 * 1024);
        (bytes / self.block_size.max(1)).max(2)
    }
}

/// Per-pool policy knobs (see `tape-api-types::Pool` for the persisted form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub retention_days: u32,
    pub allow_reuse: bool,
    pub allocation_policy: tape_api_types::AllocationPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            retention_days: 0,
            allow_reuse: true,
            allocation_policy: tape_api_types::AllocationPolicy::Continue,
        }
    }
}
