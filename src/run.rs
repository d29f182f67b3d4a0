//! Top-level run orchestration: owns the background thread a backup job
//! runs on, and the cancellation handshake described in §5 ("flush, write
//! the filemark, mark the set cancelled, release the device" — the first
//! three are handled inside the write pipeline and spanning coordinator;
//! this module is what lets a caller ask for that sequence and wait for it).
//!
//! Deliberately knows nothing about `Catalog` or `KeyRegistry` concretely:
//! a `RunSpec` carries plain closures for id allocation and persistence, so
//! this module stays a thin thread-lifecycle wrapper around
//! `SpanningCoordinator`, the way the rest of this crate keeps orchestration
//! and storage concerns in separate layers.

use std::thread::JoinHandle;

use tape_api_types::{TapeStatus, Uuid};

use crate::config::RunConfig;
use crate::device::TapeDevice;
use crate::encryption::KeyRegistry;
use crate::error::TapeResult;
use crate::pipeline::{CancelToken, SourceScanner};
use crate::spanning::{SpanningCoordinator, SpanningOutcome, TapeChanger};

pub fn now() -> i64 {
    proxmox_time::epoch_i64()
}

/// Everything one backup run needs. `tape_info_of` and `next_set_id` close
/// over whatever catalog the caller is using; the caller persists the
/// result (insert sets/entries, commit or roll back the transaction) after
/// `join()` returns, using the `SpanningOutcome` it hands back.
pub struct RunSpec {
    pub job_id: String,
    pub spanning_set_id: u64,
    pub pool: String,
    pub device: Box<dyn TapeDevice>,
    pub scanner: Box<dyn SourceScanner>,
    pub changer: Box<dyn TapeChanger>,
    pub key: Option<[u8; 32]>,
    /// `EncryptionKey.id` the pinned `key` material came from; `None` iff
    /// `key` is `None`.
    pub key_id: Option<u64>,
    /// Registry `key_id` was pinned from, if any; the coordinator marks the
    /// key permanently referenced the moment a set written under it
    /// completes, so it outlives this run's own pin.
    pub key_registry: Option<KeyRegistry>,
    pub config: RunConfig,
    /// Resolves a mounted tape's label uuid to `(tape_id, status,
    /// pool_allow_reuse)`.
    pub tape_info_of: Box<dyn FnMut(Uuid) -> TapeResult<(u64, TapeStatus, bool)> + Send>,
    pub next_set_id: Box<dyn FnMut() -> u64 + Send>,
}

/// Handle to a run in progress. Dropping it without calling `join` detaches
/// the background thread; it keeps running to completion regardless.
pub struct RunHandle {
    cancel: CancelToken,
    thread: Option<JoinHandle<TapeResult<SpanningOutcome>>>,
}

impl RunHandle {
    /// Request cancellation. Takes effect at the next record boundary, not
    /// immediately; `join` still needs to be called to observe the result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the run finishes (normally, cancelled, or failed).
    pub fn join(mut self) -> TapeResult<SpanningOutcome> {
        self.thread
            .take()
            .expect("join called twice")
            .join()
            .expect("run thread panicked")
    }
}

pub fn start_run(mut spec: RunSpec) -> RunHandle {
    let cancel = CancelToken::new();
    let cancel_for_thread = cancel.clone();

    let thread = std::thread::Builder::new()
        .name("tapearc-run".into())
        .spawn(move || -> TapeResult<SpanningOutcome> {
            let mut coordinator = SpanningCoordinator::new(spec.config.clone(), spec.key, spec.key_id);
            if let Some(registry) = spec.key_registry.clone() {
                coordinator = coordinator.with_key_registry(registry);
            }
            coordinator.run(
                &spec.job_id,
                spec.spanning_set_id,
                &spec.pool,
                spec.device,
                spec.scanner,
                spec.changer.as_mut(),
                &cancel_for_thread,
                &mut spec.tape_info_of,
                &mut spec.next_set_id,
            )
        })
        .expect("spawn run thread");

    RunHandle {
        cancel,
        thread: Some(thread),
    }
}
