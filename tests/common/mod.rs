//! Shared fixtures for the integration suite: a simulated tape device
//! wired up with a label already written, small helpers to build source
//! files, and a couple of `TapeChanger` stand-ins for the spanning tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

pub use tapearc::device::{SimulatedBackingStore, SimulatedTapeDevice, TapeDevice};
pub use tapearc::error::{TapeError, TapeResult};
pub use tapearc::pipeline::SourceFile;
pub use tapearc::spanning::{SpanningOutcome, TapeChanger};
pub use tape_api_types::Uuid;

use tapearc::label::{self, LabelRecord};
use tapearc::pipeline::{CancelToken, InMemorySourceScanner};
use tapearc::run::now;
use tapearc::spanning::SpanningCoordinator;

pub use tape_api_types::TapeStatus;
use tape_api_types::tape_change::TapeChangeRequest;

pub const BLOCK_SIZE: usize = 512;

static LOG_INIT: Once = Once::new();

/// Every test that exercises `SpanningCoordinator`/`WritePipeline` goes
/// through `info!`/`warn!` call sites; route them to stderr the way this
/// crate's own binaries wire up `env_logger`, instead of letting them vanish
/// into the default no-op logger.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn source_file(path: &str, payload: Vec<u8>) -> SourceFile {
    SourceFile {
        path: path.to_string(),
        mode: 0o644,
        uid: 1000,
        gid: 1000,
        mtime: 1_700_000_000,
        payload,
    }
}

/// A small deterministic xorshift stream, standing in for "random bytes,
/// seed=N" test payloads without pulling in a rand crate dependency this
/// core has no other use for.
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_685_821_657_736_338_717).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state & 0xff) as u8
        })
        .collect()
}

pub fn run_config() -> tapearc::config::RunConfig {
    tapearc::config::RunConfig {
        block_size: BLOCK_SIZE,
        buffer_depth_mb: 1,
        write_retries: 2,
        read_retries: 2,
        verify_after_write: true,
        operator_timeout_seconds: 1,
        default_device: "/dev/null".into(),
    }
}

/// Create a blank simulated tape of `capacity_bytes`, write its label for
/// `pool`, and return the backing store handle (for corruption/inspection),
/// the boxed device, and the tape's UUID.
pub fn new_labeled_tape(capacity_bytes: u64, pool: &str) -> (Arc<Mutex<SimulatedBackingStore>>, Box<dyn TapeDevice>, Uuid) {
    let store = SimulatedBackingStore::new(capacity_bytes);
    let mut device = SimulatedTapeDevice::new(store.clone(), BLOCK_SIZE);
    let uuid = Uuid::generate();
    let label_record = LabelRecord::new(uuid, pool, "LTO-9", now());
    label::write_label(&mut device, &label_record).expect("write label");
    (store, Box::new(device), uuid)
}

/// Create a genuinely blank simulated tape of `capacity_bytes` — no label
/// written — for exercising the spanning coordinator's own blank-tape
/// labeling path on a remount.
pub fn new_blank_tape(capacity_bytes: u64) -> (Arc<Mutex<SimulatedBackingStore>>, Box<dyn TapeDevice>, Uuid) {
    let store = SimulatedBackingStore::new(capacity_bytes);
    let device = SimulatedTapeDevice::new(store.clone(), BLOCK_SIZE);
    (store, Box::new(device), Uuid::generate())
}

/// A changer fed a fixed queue of `(uuid, device)` pairs. Exhausting the
/// queue simulates an operator who never shows up.
pub struct QueueChanger {
    queue: Vec<(Uuid, Box<dyn TapeDevice>)>,
}

impl QueueChanger {
    pub fn new(queue: Vec<(Uuid, Box<dyn TapeDevice>)>) -> Self {
        Self { queue }
    }
}

impl TapeChanger for QueueChanger {
    fn request_change(&mut self, _request: &TapeChangeRequest, _timeout: Duration) -> TapeResult<(Uuid, Box<dyn TapeDevice>)> {
        if self.queue.is_empty() {
            return Err(TapeError::timeout("operator never acknowledged the tape change"));
        }
        Ok(self.queue.remove(0))
    }
}

/// A changer that never succeeds, for the tape-change-timeout scenario.
pub struct NeverChanger;

impl TapeChanger for NeverChanger {
    fn request_change(&mut self, _request: &TapeChangeRequest, _timeout: Duration) -> TapeResult<(Uuid, Box<dyn TapeDevice>)> {
        Err(TapeError::timeout("operator never acknowledged the tape change"))
    }
}

/// Drive `SpanningCoordinator::run` against a UUID->tape-id map known ahead
/// of time (every tape involved must be present in the map; the first one
/// must already be labeled, later ones may be blank) and a monotonic
/// `BackupSet.id` counter starting at 1.
pub fn run_coordinator(
    device: Box<dyn TapeDevice>,
    files: Vec<SourceFile>,
    changer: &mut dyn TapeChanger,
    pool: &str,
    tape_ids: HashMap<Uuid, u64>,
    key: Option<[u8; 32]>,
    key_id: Option<u64>,
) -> TapeResult<SpanningOutcome> {
    init_logging();
    let scanner = Box::new(InMemorySourceScanner::new(files));
    let cancel = CancelToken::new();
    let next_id = Cell::new(1u64);
    let first_call = Cell::new(true);
    let mut coordinator = SpanningCoordinator::new(run_config(), key, key_id);
    coordinator.run(
        "job-1",
        1,
        pool,
        device,
        scanner,
        changer,
        &cancel,
        |uuid: Uuid| {
            let id = tape_ids
                .get(&uuid)
                .copied()
                .ok_or_else(|| TapeError::bad_label("unknown tape uuid"))?;
            // The initial device is already mounted and labeled by the
            // fixture that built it; every later call here is the
            // coordinator checking a tape it just remounted, which in this
            // suite is always a freshly minted blank one (see
            // `new_blank_tape`) unless the test pre-labels it itself.
            let status = if first_call.replace(false) { TapeStatus::Active } else { TapeStatus::Blank };
            Ok((id, status, true))
        },
        || {
            let id = next_id.get();
            next_id.set(id + 1);
            id
        },
    )
}
