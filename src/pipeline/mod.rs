//! C5: the write pipeline (§4.5).
//!
//! Three stages connected by bounded `crossbeam_channel`s, mirroring the
//! thread-pool-with-bounded-queue idiom used elsewhere in this codebase
//! (see `tools::parallel_handler`) rather than an async runtime: Reader and
//! Encoder each run on their own thread, the Writer stage runs on the
//! calling thread (it alone touches the device). `std::thread::scope` lets
//! the Writer borrow `&mut dyn TapeDevice` without forcing the other stages
//! onto `'static` data.
//!
//! Every archive record is encoded (and, for encrypted sets, AEAD-framed)
//! into one self-contained, block-padded buffer before it is ever handed to
//! the Writer. That buffer is written to the device with a single
//! `write_block` call, which is atomic: either the whole record lands or
//! none of it does. A tape-full event can therefore never split a record,
//! and the chunk codec session is scoped per record rather than per set —
//! each record carries its own magic header — which keeps `block_offset`
//! exact for restores even when the set is encrypted (see `DESIGN.md`).

mod encoder;
mod scanner;

pub use scanner::{FilesystemScanner, InMemorySourceScanner, SourceFile, SourceScanner};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, RecvError};
use log::{debug, info, warn};

use tape_api_types::CatalogEntry;

use crate::config::RunConfig;
use crate::device::TapeDevice;
use crate::error::{ErrorKind, TapeError, TapeResult};

use encoder::{encode_record, encode_terminator};

/// Cooperative cancellation flag shared between the run orchestrator and the
/// pipeline's stages. Checked between records, never mid-record.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the pipeline stopped writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The scanner ran out of files; the set is complete.
    SourceExhausted,
    /// `write_block` returned `EndOfMedium` partway through; the in-flight
    /// record was discarded and this tape-file was closed at the last
    /// complete record.
    EndOfMedium,
    Cancelled,
}

/// Result of one pipeline run against one already-mounted, positioned tape.
pub struct PipelineOutcome {
    pub entries: Vec<CatalogEntry>,
    pub bytes_written: u64,
    pub files_written: u64,
    pub stop_reason: StopReason,
}

struct RecordMsg {
    entry_path: String,
    file_size: u64,
    checksum: [u8; 32],
    mode: u32,
    mtime: i64,
    bytes: Vec<u8>,
}

/// Drives one backup set's worth of files through Reader -> Encoder ->
/// Writer onto `device`, starting at whatever position the caller has
/// already sought to (normally right after the label, or right after the
/// previous set's TOC).
pub struct WritePipeline<'a> {
    device: &'a mut dyn TapeDevice,
    config: RunConfig,
    key: Option<[u8; 32]>,
}

impl<'a> WritePipeline<'a> {
    pub fn new(device: &'a mut dyn TapeDevice, config: RunConfig, key: Option<[u8; 32]>) -> Self {
        Self { device, config, key }
    }

    /// Run the pipeline until the scanner is exhausted, the device reports
    /// `EndOfMedium`, or `cancel` is observed. `backup_set_id` goes into each
    /// produced `CatalogEntry`, `start_block` is this tape-file's first
    /// block (0, since the pipeline writes its own filemark-delimited file).
    pub fn run(
        &mut self,
        scanner: &mut dyn SourceScanner,
        backup_set_id: u64,
        cancel: &CancelToken,
    ) -> TapeResult<PipelineOutcome> {
        let block_size = self.config.block_size;
        let key = self.key;
        let depth = self.config.queue_depth_blocks().min(64).max(2);

        let (reader_tx, reader_rx) = bounded::<SourceFile>(depth);
        let (encoder_tx, encoder_rx) = bounded::<RecordMsg>(depth);

        let reader_cancel = cancel.clone();
        let encoder_cancel = cancel.clone();

        let outcome = std::thread::scope(|scope| -> TapeResult<PipelineOutcome> {
            let reader_handle = std::thread::Builder::new()
                .name("pipeline-reader".into())
                .spawn_scoped(scope, move || {
                    loop {
                        if reader_cancel.is_cancelled() {
                            return;
                        }
                        match scanner.next_file() {
                            Ok(Some(file)) => {
                                if reader_tx.send(file).is_err() {
                                    return;
                                }
                            }
                            Ok(None) => return,
                            Err(err) => {
                                warn!("source scan aborted: {err}");
                                return;
                            }
                        }
                    }
                })
                .expect("spawn reader thread");

            let encoder_handle = std::thread::Builder::new()
                .name("pipeline-encoder".into())
                .spawn_scoped(scope, move || loop {
                    if encoder_cancel.is_cancelled() {
                        return;
                    }
                    let file = match reader_rx.recv() {
                        Ok(file) => file,
                        Err(RecvError) => return,
                    };
                    let checksum = sha256(&file.payload);
                    let bytes = match encode_record(&file, block_size, key) {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            warn!("record encode failed for {}: {err}", file.path);
                            return;
                        }
                    };
                    let msg = RecordMsg {
                        entry_path: file.path,
                        file_size: file.payload.len() as u64,
                        checksum,
                        mode: file.mode,
                        mtime: file.mtime,
                        bytes,
                    };
                    if encoder_tx.send(msg).is_err() {
                        return;
                    }
                })
                .expect("spawn encoder thread");

            let outcome = self.run_writer(encoder_rx, backup_set_id, cancel)?;

            let _ = reader_handle.join();
            let _ = encoder_handle.join();
            Ok(outcome)
        })?;

        Ok(outcome)
    }

    /// Writer stage: runs on the calling thread so it can own `&mut self.device`.
    fn run_writer(
        &mut self,
        encoder_rx: crossbeam_channel::Receiver<RecordMsg>,
        backup_set_id: u64,
        cancel: &CancelToken,
    ) -> TapeResult<PipelineOutcome> {
        let mut entries = Vec::new();
        let mut blocks_written: u64 = 0;
        let mut files_written: u64 = 0;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            let msg = match encoder_rx.recv() {
                Ok(msg) => msg,
                Err(RecvError) => break StopReason::SourceExhausted,
            };

            debug_assert_eq!(msg.bytes.len() % self.config.block_size, 0);
            match self.write_with_retries(&msg.bytes) {
                Ok(()) => {
                    let block_offset = blocks_written;
                    blocks_written += (msg.bytes.len() / self.config.block_size) as u64;
                    files_written += 1;
                    entries.push(CatalogEntry {
                        backup_set_id,
                        file_path: msg.entry_path,
                        file_size: msg.file_size,
                        mode: msg.mode,
                        mtime: msg.mtime,
                        checksum: msg.checksum,
                        block_offset,
                        file_number: 0,
                    });
                }
                Err(err) if err.kind() == ErrorKind::EndOfMedium => {
                    info!(
                        "end of medium after {files_written} files ({blocks_written} blocks); \
                         discarding in-flight record"
                    );
                    break StopReason::EndOfMedium;
                }
                Err(err) => return Err(err),
            }
        };

        let mut stop_reason = stop_reason;
        if stop_reason == StopReason::SourceExhausted {
            let terminator = encode_terminator(self.config.block_size, self.key)?;
            match self.write_with_retries(&terminator) {
                Ok(()) => blocks_written += (terminator.len() / self.config.block_size) as u64,
                Err(err) if err.kind() == ErrorKind::EndOfMedium => stop_reason = StopReason::EndOfMedium,
                Err(err) => return Err(err),
            }
        }
        self.device.write_filemark()?;

        let bytes_written = blocks_written * self.config.block_size as u64;
        Ok(PipelineOutcome {
            entries,
            bytes_written,
            files_written,
            stop_reason,
        })
    }

    /// Write one already-block-aligned record buffer, retrying transient
    /// failures up to `write_retries` times with a backspace between
    /// attempts (undoing whatever partial position change the drive made).
    fn write_with_retries(&mut self, buf: &[u8]) -> TapeResult<()> {
        let mut attempt = 0;
        loop {
            match self.device.write_block(buf) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::EndOfMedium => return Err(err),
                Err(err) if err.is_transient() && attempt < self.config.write_retries => {
                    attempt += 1;
                    warn!("transient write error (attempt {attempt}): {err}");
                    let _ = self.device.backspace_block();
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = openssl::sha::Sha256::new();
    hasher.update(data);
    hasher.finish()
}

/// Rewind to `start_block` and recompute SHA-256 over every written record's
/// payload, comparing against the catalog entries just produced. Used when
/// `RunConfig::verify_after_write` is set.
pub fn verify_after_write(
    device: &mut dyn TapeDevice,
    block_size: usize,
    entries: &[CatalogEntry],
    key: Option<[u8; 32]>,
) -> TapeResult<()> {
    use crate::archive::ArchiveReader;
    use crate::blocked::BlockedReader;
    use crate::codec::ChunkDecryptReader;

    let mut current_file = None;
    for entry in entries {
        // The caller hands us the device wherever its last write left it —
        // past this set's TOC, not rewound to the content file `entry` lives
        // in — so every entry needs an explicit `seek_file` before
        // `seek_block`, same as the restore planner's `execute_plan`.
        if current_file != Some(entry.file_number) {
            device.seek_file(entry.file_number)?;
            current_file = Some(entry.file_number);
        }
        device.seek_block(entry.block_offset)?;
        let reader = BlockedReader::new(device);
        let (header, payload) = match key {
            Some(key) => {
                let decrypt = ChunkDecryptReader::new(reader, key);
                let mut archive = ArchiveReader::new(decrypt, block_size);
                archive
                    .read_member()?
                    .ok_or_else(|| TapeError::invariant_violation("expected a member at verify time"))?
            }
            None => {
                let mut archive = ArchiveReader::new(reader, block_size);
                archive
                    .read_member()?
                    .ok_or_else(|| TapeError::invariant_violation("expected a member at verify time"))?
            }
        };
        if header.path != entry.file_path {
            return Err(TapeError::checksum_mismatch(format!(
                "verify found '{}' at block {}, expected '{}'",
                header.path, entry.block_offset, entry.file_path
            )));
        }
        if payload.len() as u64 != entry.file_size || header.checksum != entry.checksum {
            return Err(TapeError::checksum_mismatch(format!(
                "verify mismatch for '{}'",
                entry.file_path
            )));
        }
    }
    Ok(())
}
