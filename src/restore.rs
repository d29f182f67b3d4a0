//! C8: the restore planner (§4.8).
//!
//! Resolves a set of requested paths against catalog entries into a plan —
//! one step per file, grouped and ordered so a single-pass execution never
//! backtracks on a tape: ascending `file_number` (tape-file), then ascending
//! `block_offset` within it. Execution seeks directly to each step rather
//! than replaying the whole archive stream, which the per-record chunk
//! codec framing (see `pipeline::encoder`) makes safe even for encrypted
//! sets. A checksum mismatch on one file is reported and skipped; it never
//! aborts the rest of the plan.

use std::time::Duration;

use log::warn;

use tape_api_types::catalog_entry::CatalogEntry;

use crate::archive::ArchiveReader;
use crate::blocked::BlockedReader;
use crate::codec::ChunkDecryptReader;
use crate::device::TapeDevice;
use crate::error::{ErrorKind, TapeError, TapeResult};

/// One file to recover, located on a specific tape.
#[derive(Debug, Clone)]
pub struct RestoreStep {
    pub tape_id: u64,
    pub file_number: u64,
    pub block_offset: u64,
    pub entry: CatalogEntry,
}

/// Build an execution-ordered plan from catalog rows. `lookup` maps each
/// requested `backup_set_id` to `(tape_id, entries)` — the caller already
/// knows this from `Catalog::load_set_with_entries`. Each entry's own
/// `file_number` (stamped by the spanning coordinator when the set was
/// written) places it on the tape.
pub fn plan_restore(
    requests: &[(u64, String)],
    lookup: impl Fn(u64) -> TapeResult<(u64, Vec<CatalogEntry>)>,
) -> TapeResult<Vec<RestoreStep>> {
    let mut steps = Vec::new();
    for (set_id, path) in requests {
        let (tape_id, entries) = lookup(*set_id)?;
        let entry = entries
            .into_iter()
            .find(|e| &e.file_path == path)
            .ok_or_else(|| TapeError::invariant_violation(format!("'{path}' not found in set {set_id}")))?;
        steps.push(RestoreStep {
            tape_id,
            file_number: entry.file_number,
            block_offset: entry.block_offset,
            entry,
        });
    }
    steps.sort_by(|a, b| (a.file_number, a.block_offset).cmp(&(b.file_number, b.block_offset)));
    Ok(steps)
}

/// One recovered file, or a reason it could not be recovered.
pub enum RestoreResult {
    Ok { path: String, payload: Vec<u8> },
    ChecksumMismatch { path: String },
}

/// Execute a plan already filtered down to steps living on `device`
/// (mounted at the tape `tape_id` the caller has verified). Steps are
/// expected pre-sorted by `plan_restore`; this function does not reorder.
pub fn execute_plan(
    device: &mut dyn TapeDevice,
    block_size: usize,
    steps: &[RestoreStep],
    key: Option<[u8; 32]>,
    read_retries: u32,
) -> TapeResult<Vec<RestoreResult>> {
    let mut results = Vec::new();
    let mut current_file = None;

    for step in steps {
        if current_file != Some(step.file_number) {
            device.seek_file(step.file_number)?;
            current_file = Some(step.file_number);
        }
        match read_one(device, block_size, step, key, read_retries) {
            Ok((path, payload)) => results.push(RestoreResult::Ok { path, payload }),
            Err(err) if err.kind() == ErrorKind::ChecksumMismatch => {
                warn!("checksum mismatch restoring '{}': {err}", step.entry.file_path);
                results.push(RestoreResult::ChecksumMismatch {
                    path: step.entry.file_path.clone(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(results)
}

fn read_one(
    device: &mut dyn TapeDevice,
    block_size: usize,
    step: &RestoreStep,
    key: Option<[u8; 32]>,
    read_retries: u32,
) -> TapeResult<(String, Vec<u8>)> {
    let mut attempt = 0;
    loop {
        match try_read_one(device, block_size, step, key) {
            Ok(result) => return Ok(result),
            Err(err) if err.is_transient() && attempt < read_retries => {
                attempt += 1;
                warn!("transient read error restoring '{}' (attempt {attempt}): {err}", step.entry.file_path);
                std::thread::sleep(Duration::from_millis(100 * attempt as u64));
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

fn try_read_one(
    device: &mut dyn TapeDevice,
    block_size: usize,
    step: &RestoreStep,
    key: Option<[u8; 32]>,
) -> TapeResult<(String, Vec<u8>)> {
    device.seek_block(step.block_offset)?;
    let reader = BlockedReader::new(device);
    let member = match key {
        Some(key) => {
            let decrypt = ChunkDecryptReader::new(reader, key);
            ArchiveReader::new(decrypt, block_size).read_member()?
        }
        None => ArchiveReader::new(reader, block_size).read_member()?,
    };
    let (header, payload) = member.ok_or_else(|| TapeError::invariant_violation("expected a member, found terminator"))?;
    Ok((header.path, payload))
}
