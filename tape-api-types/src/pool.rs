use serde::{Deserialize, Serialize};

/// How a pool picks the next tape once the current one is exhausted.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationPolicy {
    /// Prefer the currently active tape; fall back to the oldest blank/expired tape.
    Continue,
    /// Always start a fresh tape, failing if none is blank.
    AlwaysNew,
}

/// A policy grouping of tapes that share retention and allocation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: u64,
    pub name: String,
    /// 0 means retain forever.
    pub retention_days: u32,
    pub allow_reuse: bool,
    pub allocation_policy: AllocationPolicy,
}

impl Pool {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            retention_days: 0,
            allow_reuse: true,
            allocation_policy: AllocationPolicy::Continue,
        }
    }

    pub fn retains_forever(&self) -> bool {
        self.retention_days == 0
    }
}
