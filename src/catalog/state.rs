//! Tape lifecycle transition graph (§4.7's data model).

use tape_api_types::tape::TapeStatus;

use crate::error::{TapeError, TapeResult};

/// Validate a proposed `Tape.status` transition. Returns `CatalogConflict`
/// for anything not in the graph, so a racing writer or a stale client
/// retry never silently corrupts tape state.
pub fn validate_transition(from: TapeStatus, to: TapeStatus) -> TapeResult<()> {
    use TapeStatus::*;
    let allowed = matches!(
        (from, to),
        (Blank, Active)
            | (Active, Full)
            | (Active, Expired)
            | (Active, Retired)
            | (Full, Expired)
            | (Full, Retired)
            | (Expired, Active) // relabeled for reuse
            | (Expired, Retired)
            | (Expired, Exported)
            | (Retired, Exported)
            | (_, Exported)
    ) || from == to;
    if allowed {
        Ok(())
    } else {
        Err(TapeError::catalog_conflict(format!(
            "illegal tape status transition {from:?} -> {to:?}"
        )))
    }
}
