//! C7: catalog and tape state machine (§4.7).
//!
//! Persisted as flat JSON rather than a SQL engine, matching how the rest of
//! this crate's on-medium structures are serialized (`label.rs`, `TOC`) and
//! the small, purpose-built media catalog this tape stack has always used
//! rather than an embedded database. A `begin`/`commit`/`rollback`
//! transaction is a staged copy of the whole in-memory structure, swapped in
//! on commit and discarded on rollback; scale is bounded by what a single
//! backup environment's tape inventory looks like (thousands of tapes and
//! sets, not millions), so no indexing beyond `HashMap` is needed.

mod migrations;
mod state;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use proxmox_uuid::Uuid;
use serde::{Deserialize, Serialize};

use tape_api_types::backup_set::BackupSet;
use tape_api_types::catalog_entry::CatalogEntry;
use tape_api_types::pool::{AllocationPolicy, Pool};
use tape_api_types::tape::{Tape, TapeStatus};

use crate::error::{TapeError, TapeResult};

pub use state::validate_transition;

/// Transactional boundary around a batch of catalog writes (one backup set's
/// worth: the set row, its entries, and the owning tape's updated usage).
pub trait Catalog: Send {
    fn begin(&mut self) -> TapeResult<()>;
    fn insert_set(&mut self, set: BackupSet) -> TapeResult<()>;
    fn insert_entries(&mut self, entries: &[CatalogEntry]) -> TapeResult<()>;
    fn update_tape(&mut self, tape: Tape) -> TapeResult<()>;
    fn commit(&mut self) -> TapeResult<()>;
    fn rollback(&mut self) -> TapeResult<()>;

    fn find_tape_by_uuid(&self, uuid: Uuid) -> TapeResult<Option<Tape>>;
    fn list_pool_tapes(&self, pool_id: u64) -> TapeResult<Vec<Tape>>;
    fn load_set_with_entries(&self, set_id: u64) -> TapeResult<Option<(BackupSet, Vec<CatalogEntry>)>>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    schema_version: u32,
    tapes: HashMap<u64, Tape>,
    sets: HashMap<u64, BackupSet>,
    entries: HashMap<u64, Vec<CatalogEntry>>,
    next_tape_id: u64,
}

/// Flat-file backed `Catalog`. One file holds the whole inventory.
pub struct JsonFileCatalog {
    path: PathBuf,
    committed: CatalogData,
    staging: Option<CatalogData>,
}

impl JsonFileCatalog {
    pub fn open(path: impl Into<PathBuf>) -> TapeResult<Self> {
        let path = path.into();
        let mut data = if path.exists() {
            let raw = fs::read(&path).map_err(TapeError::from)?;
            serde_json::from_slice(&raw)?
        } else {
            CatalogData::default()
        };
        migrations::apply(&mut data);
        Ok(Self {
            path,
            committed: data,
            staging: None,
        })
    }

    fn active(&mut self) -> &mut CatalogData {
        self.staging.get_or_insert_with(|| self.committed.clone())
    }

    fn persist(&self, data: &CatalogData) -> TapeResult<()> {
        let json = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                proxmox_sys::fs::create_path(parent, None, Some(proxmox_sys::fs::CreateOptions::new()))
                    .map_err(|err| TapeError::io_fatal(err))?;
            }
        }
        proxmox_sys::fs::replace_file(&self.path, &json, proxmox_sys::fs::CreateOptions::new(), true)
            .map_err(|err| TapeError::io_fatal(err))?;
        Ok(())
    }

    /// Register a brand-new tape (blank, id auto-assigned) into the
    /// committed state directly — this is its own atomic operation, outside
    /// any set-writing transaction.
    pub fn allocate_tape(&mut self, uuid: Uuid, pool_id: u64, capacity_bytes: u64, label: String) -> TapeResult<Tape> {
        let id = self.committed.next_tape_id;
        self.committed.next_tape_id += 1;
        let tape = Tape::new_blank(id, uuid, label, pool_id, capacity_bytes);
        self.committed.tapes.insert(id, tape.clone());
        self.persist(&self.committed)?;
        Ok(tape)
    }

    /// Pick a tape to write into for `pool`, per its `AllocationPolicy`.
    /// `Continue` prefers the most recently written active tape;
    /// `AlwaysNew` never reuses one (the caller must allocate a blank tape
    /// if this returns `None`).
    pub fn select_tape_for_write(&self, pool: &Pool) -> Option<Tape> {
        let mut candidates: Vec<&Tape> = self
            .committed
            .tapes
            .values()
            .filter(|t| t.pool_id == pool.id && t.status == TapeStatus::Active)
            .collect();
        match pool.allocation_policy {
            AllocationPolicy::AlwaysNew => None,
            AllocationPolicy::Continue => {
                candidates.sort_by_key(|t| std::cmp::Reverse(t.last_written_at.unwrap_or(0)));
                candidates.into_iter().next().cloned()
            }
        }
    }
}

impl Catalog for JsonFileCatalog {
    fn begin(&mut self) -> TapeResult<()> {
        if self.staging.is_some() {
            return Err(TapeError::invariant_violation("transaction already in progress"));
        }
        self.staging = Some(self.committed.clone());
        Ok(())
    }

    fn insert_set(&mut self, set: BackupSet) -> TapeResult<()> {
        self.active().sets.insert(set.id, set);
        Ok(())
    }

    fn insert_entries(&mut self, entries: &[CatalogEntry]) -> TapeResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let set_id = entries[0].backup_set_id;
        self.active().entries.entry(set_id).or_default().extend(entries.iter().cloned());
        Ok(())
    }

    fn update_tape(&mut self, tape: Tape) -> TapeResult<()> {
        let data = self.active();
        if let Some(existing) = data.tapes.get(&tape.id) {
            validate_transition(existing.status, tape.status)?;
        }
        data.tapes.insert(tape.id, tape);
        Ok(())
    }

    fn commit(&mut self) -> TapeResult<()> {
        let staged = self
            .staging
            .take()
            .ok_or_else(|| TapeError::invariant_violation("no transaction in progress"))?;
        self.persist(&staged)?;
        self.committed = staged;
        Ok(())
    }

    fn rollback(&mut self) -> TapeResult<()> {
        self.staging = None;
        Ok(())
    }

    fn find_tape_by_uuid(&self, uuid: Uuid) -> TapeResult<Option<Tape>> {
        Ok(self.committed.tapes.values().find(|t| t.uuid == uuid).cloned())
    }

    fn list_pool_tapes(&self, pool_id: u64) -> TapeResult<Vec<Tape>> {
        Ok(self
            .committed
            .tapes
            .values()
            .filter(|t| t.pool_id == pool_id)
            .cloned()
            .collect())
    }

    fn load_set_with_entries(&self, set_id: u64) -> TapeResult<Option<(BackupSet, Vec<CatalogEntry>)>> {
        let Some(set) = self.committed.sets.get(&set_id) else {
            return Ok(None);
        };
        let entries = self.committed.entries.get(&set_id).cloned().unwrap_or_default();
        Ok(Some((set.clone(), entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tape_api_types::backup_set::{BackupType, SetStatus};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tapearc-catalog-test-{name}-{}.json", std::process::id()))
    }

    fn test_set(id: u64, status: SetStatus) -> BackupSet {
        BackupSet {
            id,
            job_id: "job".into(),
            tape_id: 1,
            set_type: BackupType::Full,
            start_time: 0,
            end_time: None,
            status,
            file_count: 0,
            total_bytes: 0,
            start_block: 0,
            end_block: 0,
            checksum: None,
            parent_set_id: None,
            format: tape_api_types::TapeFormat::Raw,
            encrypted: false,
            encryption_key_id: None,
            compressed: false,
        }
    }

    #[test]
    fn commit_makes_writes_visible_rollback_discards_them() {
        let path = temp_path("commit-rollback");
        let _ = fs::remove_file(&path);
        let mut catalog = JsonFileCatalog::open(&path).unwrap();

        catalog.begin().unwrap();
        catalog.insert_set(test_set(1, SetStatus::Running)).unwrap();
        catalog.rollback().unwrap();
        assert!(catalog.load_set_with_entries(1).unwrap().is_none());

        catalog.begin().unwrap();
        catalog.insert_set(test_set(1, SetStatus::Completed)).unwrap();
        catalog.commit().unwrap();
        assert!(catalog.load_set_with_entries(1).unwrap().is_some());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn illegal_tape_transition_rejected_inside_transaction() {
        let path = temp_path("illegal-transition");
        let _ = fs::remove_file(&path);
        let mut catalog = JsonFileCatalog::open(&path).unwrap();
        let tape = catalog
            .allocate_tape(Uuid::generate(), 1, 1_000_000, "L1".into())
            .unwrap();

        catalog.begin().unwrap();
        let mut active = tape.clone();
        active.status = TapeStatus::Active;
        catalog.update_tape(active.clone()).unwrap();
        catalog.commit().unwrap();

        catalog.begin().unwrap();
        let mut full = active.clone();
        full.status = TapeStatus::Full;
        catalog.update_tape(full).unwrap();
        catalog.commit().unwrap();

        catalog.begin().unwrap();
        let mut blank_again = active;
        blank_again.status = TapeStatus::Blank;
        assert!(catalog.update_tape(blank_again).is_err());
        catalog.rollback().unwrap();

        let _ = fs::remove_file(&path);
    }
}
