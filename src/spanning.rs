//! C6: the spanning coordinator (§4.6).
//!
//! Drives the write pipeline across as many tapes as a job needs.
//! `idle -> writing -> awaiting_tape_change -> remounting -> writing -> ...
//! -> completed|cancelled|failed`. A `TapeFull` transition pauses the
//! coordinator and hands a `TapeChangeRequest` to a `TapeChanger`; resuming
//! re-verifies the newly mounted tape's label before any bytes are written
//! to it, so a mismatched or unlabeled tape fails the run instead of
//! silently corrupting the spanning set.

use std::time::Duration;

use log::{info, warn};
use proxmox_uuid::Uuid;

use tape_api_types::backup_set::{BackupSet, BackupType, SetStatus};
use tape_api_types::TapeFormat;
use tape_api_types::TapeStatus;
use tape_api_types::catalog_entry::CatalogEntry;
use tape_api_types::spanning::{SpanningMember, SpanningSet, SpanningStatus};
use tape_api_types::tape_change::{TapeChangeReason, TapeChangeRequest, TapeChangeStatus};

use crate::config::RunConfig;
use crate::device::TapeDevice;
use crate::encryption::KeyRegistry;
use crate::error::{TapeError, TapeResult};
use crate::label;
use crate::pipeline::{CancelToken, SourceScanner, StopReason, WritePipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanningState {
    Idle,
    Writing,
    AwaitingTapeChange,
    Remounting,
    Completed,
    Cancelled,
    Failed,
}

/// Asked to mount a new tape, returning the mounted device together with
/// its uuid once mounted (or `Err(TapeError::timeout(..))` if the operator
/// never responds within `timeout`). The uuid is needed on its own because
/// a freshly mounted blank tape carries no on-tape label to read it from —
/// the operator protocol's acknowledgement is the only source for it.
/// Implementations own whatever changer hardware or operator prompt is
/// involved; this crate only defines the contract.
pub trait TapeChanger: Send {
    fn request_change(&mut self, request: &TapeChangeRequest, timeout: Duration) -> TapeResult<(Uuid, Box<dyn TapeDevice>)>;
}

pub struct SpanningOutcome {
    pub spanning_set: SpanningSet,
    pub members: Vec<SpanningMember>,
    pub backup_sets: Vec<BackupSet>,
    pub entries: Vec<CatalogEntry>,
    pub state: SpanningState,
}

pub struct SpanningCoordinator {
    config: RunConfig,
    key: Option<[u8; 32]>,
    key_id: Option<u64>,
    key_registry: Option<KeyRegistry>,
    state: SpanningState,
}

impl SpanningCoordinator {
    /// `key_id` identifies the `EncryptionKey` row `key` was pinned from
    /// (see `KeyRegistry::pin`); `None` means the set is unencrypted and
    /// `key` must also be `None`.
    pub fn new(config: RunConfig, key: Option<[u8; 32]>, key_id: Option<u64>) -> Self {
        Self {
            config,
            key,
            key_id,
            key_registry: None,
            state: SpanningState::Idle,
        }
    }

    /// Opt into marking `key_id` permanently referenced the moment a set
    /// written under it completes, so the key survives this run's own
    /// `KeyHandle` being dropped (see `KeyRegistry::remove`).
    pub fn with_key_registry(mut self, registry: KeyRegistry) -> Self {
        self.key_registry = Some(registry);
        self
    }

    pub fn state(&self) -> SpanningState {
        self.state
    }

    /// Run `job_id` to completion, writing through `device` first and
    /// requesting further tapes from `changer` as needed.
    ///
    /// `pool` is the pool name every subsequent tape's label must match.
    /// `tape_info_of` resolves a mounted tape's label UUID to the catalog's
    /// `(tape_id, status, pool_allow_reuse)` (assigning an id for a blank
    /// tape is the caller's job, done inside this callback); `next_set_id`
    /// mints a `BackupSet.id` for each tape written.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        job_id: &str,
        spanning_set_id: u64,
        pool: &str,
        mut device: Box<dyn TapeDevice>,
        mut scanner: Box<dyn SourceScanner>,
        changer: &mut dyn TapeChanger,
        cancel: &CancelToken,
        mut tape_info_of: impl FnMut(Uuid) -> TapeResult<(u64, TapeStatus, bool)>,
        mut next_set_id: impl FnMut() -> u64,
    ) -> TapeResult<SpanningOutcome> {
        let mut members = Vec::new();
        let mut backup_sets = Vec::new();
        let mut entries = Vec::new();
        let mut total_files = 0u64;
        let mut total_bytes = 0u64;
        let mut sequence_number = 1u32;
        let mut parent_set_id: Option<u64> = None;

        self.state = SpanningState::Writing;

        let final_state = loop {
            let label = label::read_label(device.as_mut())?
                .ok_or_else(|| TapeError::bad_label("tape has no label"))?;
            if label.pool != pool {
                self.state = SpanningState::Failed;
                return Err(TapeError::wrong_pool(pool, &label.pool));
            }
            let (tape_id, _, _) = tape_info_of(label.uuid)?;

            device.seek_file(1)?;

            let backup_set_id = next_set_id();
            let start_time = crate::run::now();
            let mut pipeline = WritePipeline::new(device.as_mut(), self.config.clone(), self.key);
            let mut outcome = pipeline.run(scanner.as_mut(), backup_set_id, cancel)?;
            // Every tape written by this coordinator has exactly one content
            // file (index 1, right after the label at index 0).
            for entry in &mut outcome.entries {
                entry.file_number = 1;
            }

            let checksum = if outcome.entries.is_empty() {
                None
            } else {
                Some(label::write_toc(device.as_mut(), backup_set_id, &outcome.entries, self.key)?)
            };

            let set_status = if outcome.stop_reason == StopReason::Cancelled {
                SetStatus::Cancelled
            } else {
                SetStatus::Completed
            };

            if set_status == SetStatus::Completed && self.config.verify_after_write {
                if let Err(err) =
                    crate::pipeline::verify_after_write(device.as_mut(), self.config.block_size, &outcome.entries, self.key)
                {
                    warn!("verify-after-write failed for set {backup_set_id} on tape {tape_id}: {err}");
                    self.state = SpanningState::Failed;
                    return Err(err);
                }
            }

            let files_start = total_files;
            total_files += outcome.files_written;
            total_bytes += outcome.bytes_written;
            entries.extend(outcome.entries);

            backup_sets.push(BackupSet {
                id: backup_set_id,
                job_id: job_id.to_string(),
                tape_id,
                set_type: BackupType::Full,
                start_time,
                end_time: Some(crate::run::now()),
                status: set_status,
                file_count: outcome.files_written,
                total_bytes: outcome.bytes_written,
                start_block: 0,
                end_block: outcome.bytes_written / self.config.block_size as u64,
                checksum,
                parent_set_id,
                format: TapeFormat::Raw,
                encrypted: self.key.is_some(),
                encryption_key_id: self.key_id,
                compressed: false,
            });
            parent_set_id = Some(backup_set_id);

            if set_status == SetStatus::Completed {
                if let (Some(registry), Some(key_id)) = (&self.key_registry, self.key_id) {
                    registry.mark_referenced(key_id);
                }
            }

            members.push(SpanningMember {
                spanning_set_id,
                tape_id,
                backup_set_id,
                sequence_number,
                bytes_written: outcome.bytes_written,
                files_start_index: files_start,
                files_end_index: total_files,
            });

            match outcome.stop_reason {
                StopReason::SourceExhausted => break SpanningState::Completed,
                StopReason::Cancelled => break SpanningState::Cancelled,
                StopReason::EndOfMedium => {
                    info!("tape {tape_id} full after {sequence_number} member(s); requesting a tape change");
                    self.state = SpanningState::AwaitingTapeChange;
                    let request = TapeChangeRequest {
                        id: 0,
                        spanning_set_id,
                        current_tape_id: tape_id,
                        reason: TapeChangeReason::TapeFull,
                        status: TapeChangeStatus::Pending,
                        new_tape_uuid: None,
                    };
                    let timeout = Duration::from_secs(self.config.operator_timeout_seconds);
                    let (new_uuid, mut new_device) = match changer.request_change(&request, timeout) {
                        Ok(result) => result,
                        Err(err) => {
                            warn!("tape change failed: {err}");
                            self.state = SpanningState::Failed;
                            // The changer never got far enough to hand back a
                            // uuid, so there's nothing concrete to name here.
                            return Err(TapeError::tape_unavailable(Vec::new(), err));
                        }
                    };

                    // This is the one place inside a run a label gets
                    // written: a blank tape's operator acknowledgement
                    // carries the uuid the coordinator needs, and an
                    // expired-and-reusable tape keeps its existing label
                    // rather than being relabeled (relabeling is a separate,
                    // explicit operation, never implicit inside a run).
                    let existing_label = label::read_label(new_device.as_mut())?;
                    let (_, status, allow_reuse) = tape_info_of(new_uuid)?;
                    match (&existing_label, status) {
                        (None, TapeStatus::Blank) => {
                            let record = label::LabelRecord::new(new_uuid, pool, "LTO-9", crate::run::now());
                            label::write_label(new_device.as_mut(), &record)?;
                        }
                        (Some(existing), TapeStatus::Expired) if allow_reuse => {
                            if existing.pool != pool {
                                self.state = SpanningState::Failed;
                                return Err(TapeError::wrong_pool(pool, &existing.pool));
                            }
                        }
                        _ => {
                            self.state = SpanningState::Failed;
                            return Err(TapeError::bad_label(format!(
                                "tape {new_uuid:?} not eligible to receive this spanning set \
                                 (status {status:?}, already labeled: {})",
                                existing_label.is_some()
                            )));
                        }
                    }

                    self.state = SpanningState::Remounting;
                    device = new_device;
                    sequence_number += 1;
                    self.state = SpanningState::Writing;
                }
            }
        };

        self.state = final_state;
        let status = match final_state {
            SpanningState::Completed => SpanningStatus::Completed,
            SpanningState::Cancelled | SpanningState::Failed => SpanningStatus::Failed,
            _ => SpanningStatus::InProgress,
        };

        Ok(SpanningOutcome {
            spanning_set: SpanningSet {
                id: spanning_set_id,
                job_id: job_id.to_string(),
                status,
                total_files,
                total_bytes,
            },
            members,
            backup_sets,
            entries,
            state: final_state,
        })
    }
}
